// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for fl-core operations.

use thiserror::Error;

/// All possible errors that can occur in fl-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid priority: '{0}'\n  hint: valid priorities are: CRITICAL, HIGH, NORMAL, LOW")]
    InvalidPriority(String),

    #[error("unexpected envelope type: expected '{expected}', got '{found}'")]
    UnexpectedType { expected: String, found: String },

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for fl-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
