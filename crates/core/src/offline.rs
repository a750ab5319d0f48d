// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline items: locally persisted writes pending transmission.
//!
//! Lifecycle:
//!
//! ```text
//! pending ──push ok──► synced
//!    │
//!    └─push failed (retry_count < max)──► pending
//!    └─push failed (retry_count == max)─► conflict
//! ```
//!
//! `synced` and `conflict` are mutually exclusive and both stop retries.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Process-wide nonce mixed into generated IDs.
static ID_NONCE: AtomicU64 = AtomicU64::new(0);

/// A locally persisted write pending transmission to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineItem {
    /// `{type}_{created_at}_{random}`.
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub payload: Value,
    pub created_at: u64,
    pub version: u32,
    pub synced: bool,
    pub conflict: bool,
    pub retry_count: u32,
    /// Reason of the most recent failed push.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl OfflineItem {
    /// Creates a new pending item with a freshly generated ID.
    pub fn new(item_type: impl Into<String>, payload: Value, created_at: u64) -> Self {
        let item_type = item_type.into();
        let id = generate_item_id(&item_type, created_at, &payload);
        OfflineItem {
            id,
            item_type,
            payload,
            created_at,
            version: 1,
            synced: false,
            conflict: false,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Returns true if the item should be pushed on the next sync pass.
    pub fn is_pending(&self) -> bool {
        !self.synced && !self.conflict
    }

    /// Marks the item as accepted by the server.
    pub fn mark_synced(&mut self) {
        self.synced = true;
        self.conflict = false;
        self.last_error = None;
    }

    /// Records a failed push.
    ///
    /// Returns true if this failure exhausted the retry budget and the item
    /// became a conflict.
    pub fn record_failure(&mut self, max_retries: u32, reason: impl Into<String>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(reason.into());
        if self.retry_count >= max_retries {
            self.conflict = true;
        }
        self.conflict
    }

    /// Makes a conflicted item eligible again with a fresh retry budget.
    pub fn reset_retries(&mut self) {
        self.retry_count = 0;
        self.conflict = false;
        self.synced = false;
    }

    /// Client-wins resolution: clears the conflict so the item is resent.
    pub fn clear_conflict(&mut self) {
        self.conflict = false;
        self.synced = false;
    }
}

/// Generates an item ID of the form `{type}_{created_at}_{8 hex chars}`.
///
/// The suffix is the first 4 bytes of SHA256 over the type, timestamp,
/// payload and a process-wide nonce, so two saves in the same millisecond
/// never collide.
pub fn generate_item_id(item_type: &str, created_at: u64, payload: &Value) -> String {
    let nonce = ID_NONCE.fetch_add(1, Ordering::Relaxed);
    let mut hasher = Sha256::new();
    hasher.update(item_type.as_bytes());
    hasher.update(created_at.to_le_bytes());
    hasher.update(payload.to_string().as_bytes());
    hasher.update(nonce.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    let hash = hasher.finalize();
    format!("{}_{}_{}", item_type, created_at, hex::encode(&hash[..4]))
}

#[cfg(test)]
#[path = "offline_tests.rs"]
mod tests;
