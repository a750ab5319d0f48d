// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the synchronization core.
//!
//! No error here is fatal to the process. The worst outcome is the OFFLINE
//! state with queued work, which `force_reconnect()` and `retry_failed()`
//! always resume.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;
use crate::transport::TransportError;

/// All possible errors surfaced by floorlink.
#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("sync conflict: item {id} failed {retries} times\n  hint: call retry_failed() or resolve_conflicts()")]
    SyncConflict { id: String, retries: u32 },

    #[error("subscriber {subscription} failed: {message}")]
    Subscriber { subscription: String, message: String },

    #[error("offline store error: {0}")]
    Store(#[from] StoreError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("protocol error: {0}")]
    Protocol(#[from] fl_core::Error),

    #[error("not connected to server")]
    NotConnected,

    #[error("reconnection gave up after {attempts} attempts\n  hint: call force_reconnect() once the network is back")]
    ReconnectExhausted { attempts: u32 },

    #[error("disconnected before the connection was established")]
    Disconnected,

    #[error("connection manager has shut down")]
    Shutdown,
}

impl Error {
    /// Classifies the error for lifecycle notifications.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_)
            | Error::NotConnected
            | Error::ReconnectExhausted { .. }
            | Error::Disconnected
            | Error::Shutdown => ErrorKind::Transport,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::SyncConflict { .. } => ErrorKind::SyncConflict,
            Error::Subscriber { .. } => ErrorKind::Subscriber,
            Error::Store(_) | Error::Config(_) => ErrorKind::Store,
            Error::Protocol(_) => ErrorKind::Protocol,
        }
    }
}

/// Error categories reported through the lifecycle notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connect/send failure. Recoverable through reconnect and backoff.
    Transport,
    /// Heartbeat or sync push timeout. Recoverable, counted.
    Timeout,
    /// An offline item exhausted its retries.
    SyncConflict,
    /// A subscriber callback panicked. Isolated, never propagated.
    Subscriber,
    /// An inbound frame could not be parsed.
    Protocol,
    /// The offline store failed to persist or load.
    Store,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::SyncConflict => "sync_conflict",
            ErrorKind::Subscriber => "subscriber",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Store => "store",
        };
        f.write_str(name)
    }
}

/// A specialized Result type for floorlink operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
