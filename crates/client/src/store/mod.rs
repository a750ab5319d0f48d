// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable store of offline items.
//!
//! [`OfflineStore`] serializes access to an [`ItemBackend`] behind one
//! mutex; every mutation is a single backend call, and multi-item updates
//! run inside one backend transaction.

mod memory;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use fl_core::{ClockSource, Envelope, OfflineItem};
use serde::Serialize;
use serde_json::Value;

/// Error type for offline store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("payload encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid offline item {id}: {reason}")]
    InvalidItem { id: String, reason: String },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed collection of offline items.
///
/// Backends only need get/set/delete/list-by-type semantics. `list` returns
/// items oldest first.
pub trait ItemBackend: Send {
    fn get(&self, id: &str) -> StoreResult<Option<OfflineItem>>;

    /// Inserts or replaces the item with the same id.
    fn set(&mut self, item: &OfflineItem) -> StoreResult<()>;

    /// Inserts or replaces several items atomically.
    fn set_many(&mut self, items: &[OfflineItem]) -> StoreResult<()>;

    /// Replaces the stored item with the same id. Returns false, writing
    /// nothing, if no such item exists.
    fn update(&mut self, item: &OfflineItem) -> StoreResult<bool>;

    /// Like `update` for several items, atomically. Returns how many
    /// items still existed.
    fn update_many(&mut self, items: &[OfflineItem]) -> StoreResult<usize>;

    /// Returns false if no item had this id.
    fn delete(&mut self, id: &str) -> StoreResult<bool>;

    fn list(&self, item_type: Option<&str>) -> StoreResult<Vec<OfflineItem>>;

    /// Deletes every item, or every item of one type. Returns the count.
    fn clear(&mut self, item_type: Option<&str>) -> StoreResult<usize>;

    /// Deletes every item already accepted by the server.
    fn delete_synced(&mut self) -> StoreResult<usize>;
}

pub(crate) fn check_item(item: &OfflineItem) -> StoreResult<()> {
    if item.synced && item.conflict {
        return Err(StoreError::InvalidItem {
            id: item.id.clone(),
            reason: "an item cannot be both synced and in conflict".to_string(),
        });
    }
    Ok(())
}

/// Item counts by sync state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub pending: usize,
    /// Items in conflict.
    pub failed: usize,
    pub synced: usize,
    pub total: usize,
}

/// Offline item store shared by the connection manager and the sync engine.
pub struct OfflineStore {
    backend: Mutex<Box<dyn ItemBackend>>,
    clock: Arc<dyn ClockSource>,
}

impl OfflineStore {
    pub fn new(backend: impl ItemBackend + 'static, clock: Arc<dyn ClockSource>) -> Self {
        OfflineStore { backend: Mutex::new(Box::new(backend)), clock }
    }

    /// Opens (creating if needed) a SQLite-backed store.
    pub fn open(path: &Path, clock: Arc<dyn ClockSource>) -> StoreResult<Self> {
        Ok(Self::new(SqliteBackend::open(path)?, clock))
    }

    /// Creates a non-durable store.
    pub fn in_memory(clock: Arc<dyn ClockSource>) -> Self {
        Self::new(MemoryBackend::new(), clock)
    }

    fn backend(&self) -> MutexGuard<'_, Box<dyn ItemBackend>> {
        self.backend.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Persists a new pending item.
    pub fn save(&self, item_type: &str, payload: Value) -> StoreResult<OfflineItem> {
        let item = OfflineItem::new(item_type, payload, self.clock.now_ms());
        self.backend().set(&item)?;
        tracing::debug!(id = %item.id, item_type, "offline item saved");
        Ok(item)
    }

    /// Persists an outbound envelope that could not be delivered.
    pub fn save_envelope(&self, envelope: &Envelope) -> StoreResult<OfflineItem> {
        self.save(&envelope.event_type, envelope.data.clone())
    }

    pub fn get(&self, id: &str) -> StoreResult<Option<OfflineItem>> {
        self.backend().get(id)
    }

    pub fn list(&self, item_type: Option<&str>) -> StoreResult<Vec<OfflineItem>> {
        self.backend().list(item_type)
    }

    pub fn delete(&self, id: &str) -> StoreResult<bool> {
        self.backend().delete(id)
    }

    pub fn clear(&self, item_type: Option<&str>) -> StoreResult<usize> {
        let removed = self.backend().clear(item_type)?;
        tracing::debug!(removed, item_type = item_type.unwrap_or("*"), "offline items cleared");
        Ok(removed)
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        let items = self.list(None)?;
        let mut stats = StoreStats { total: items.len(), ..Default::default() };
        for item in &items {
            if item.synced {
                stats.synced += 1;
            } else if item.conflict {
                stats.failed += 1;
            } else {
                stats.pending += 1;
            }
        }
        Ok(stats)
    }

    /// Removes items already accepted by the server.
    pub fn prune_synced(&self) -> StoreResult<usize> {
        self.backend().delete_synced()
    }

    /// Writes back an item mutated by the sync engine.
    ///
    /// Items deleted since they were read stay deleted: returns false and
    /// writes nothing.
    pub(crate) fn update(&self, item: &OfflineItem) -> StoreResult<bool> {
        check_item(item)?;
        self.backend().update(item)
    }

    /// Writes back several items, skipping deleted ones. Returns how many
    /// were written.
    pub(crate) fn update_many(&self, items: &[OfflineItem]) -> StoreResult<usize> {
        for item in items {
            check_item(item)?;
        }
        self.backend().update_many(items)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
