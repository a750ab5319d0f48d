// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Non-durable backend.

use fl_core::OfflineItem;

use super::{ItemBackend, StoreResult};

/// Vec-backed item collection, kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    items: Vec<OfflineItem>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ItemBackend for MemoryBackend {
    fn get(&self, id: &str) -> StoreResult<Option<OfflineItem>> {
        Ok(self.items.iter().find(|i| i.id == id).cloned())
    }

    fn set(&mut self, item: &OfflineItem) -> StoreResult<()> {
        match self.items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => self.items.push(item.clone()),
        }
        Ok(())
    }

    fn set_many(&mut self, items: &[OfflineItem]) -> StoreResult<()> {
        for item in items {
            self.set(item)?;
        }
        Ok(())
    }

    fn update(&mut self, item: &OfflineItem) -> StoreResult<bool> {
        match self.items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => {
                *existing = item.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn update_many(&mut self, items: &[OfflineItem]) -> StoreResult<usize> {
        let mut updated = 0;
        for item in items {
            if self.update(item)? {
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn delete(&mut self, id: &str) -> StoreResult<bool> {
        let before = self.items.len();
        self.items.retain(|i| i.id != id);
        Ok(self.items.len() != before)
    }

    fn list(&self, item_type: Option<&str>) -> StoreResult<Vec<OfflineItem>> {
        let mut items: Vec<_> = self
            .items
            .iter()
            .filter(|i| match item_type {
                Some(t) => i.item_type == t,
                None => true,
            })
            .cloned()
            .collect();
        items.sort_by_key(|i| i.created_at);
        Ok(items)
    }

    fn clear(&mut self, item_type: Option<&str>) -> StoreResult<usize> {
        let before = self.items.len();
        match item_type {
            Some(t) => self.items.retain(|i| i.item_type != t),
            None => self.items.clear(),
        }
        Ok(before - self.items.len())
    }

    fn delete_synced(&mut self) -> StoreResult<usize> {
        let before = self.items.len();
        self.items.retain(|i| !i.synced);
        Ok(before - self.items.len())
    }
}
