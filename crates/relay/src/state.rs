// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Server state management.
//!
//! Wraps the canonical item log and the fan-out channel for thread-safe
//! access from every connection task.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fl_core::{ClockSource, Envelope, Frame, SyncPush, SystemClock};
use tokio::sync::{broadcast, Mutex};

use crate::log::{ItemLog, PushOutcome};

/// Capacity of the fan-out channel. Lagging connections skip frames.
const FANOUT_CAPACITY: usize = 1024;

/// A frame relayed to every connection except the one it came from.
#[derive(Debug, Clone)]
pub struct Relayed {
    pub origin: u64,
    pub frame: String,
}

/// Shared server state.
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<ServerStateInner>,
}

struct ServerStateInner {
    log: Mutex<ItemLog>,
    fanout: broadcast::Sender<Relayed>,
    next_connection: AtomicU64,
    clock: SystemClock,
}

impl ServerState {
    /// Opens the item log in `data_dir`.
    pub fn new(data_dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let log = ItemLog::open(data_dir.join("items.jsonl"))?;
        tracing::info!(items = log.len(), "item log loaded");
        Ok(Self::with_log(log))
    }

    fn with_log(log: ItemLog) -> Self {
        let (fanout, _) = broadcast::channel(FANOUT_CAPACITY);
        ServerState {
            inner: Arc::new(ServerStateInner {
                log: Mutex::new(log),
                fanout,
                next_connection: AtomicU64::new(1),
                clock: SystemClock,
            }),
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::with_log(ItemLog::in_memory())
    }

    /// Allocates an id for a new connection.
    pub fn register(&self) -> u64 {
        self.inner.next_connection.fetch_add(1, Ordering::Relaxed)
    }

    pub fn now_ms(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    /// Applies a pushed item. Accepted items are relayed to the other
    /// connections as an envelope of the item's own type.
    pub async fn apply_push(&self, push: &SyncPush, origin: u64) -> io::Result<PushOutcome> {
        let outcome = self.inner.log.lock().await.apply(push)?;
        if outcome == PushOutcome::Applied {
            let envelope = Envelope::new(push.item_type.clone(), push.payload.clone(), self.now_ms());
            self.relay(vec![envelope], origin);
        }
        Ok(outcome)
    }

    /// Relays application envelopes to every other connection.
    pub fn relay(&self, envelopes: Vec<Envelope>, origin: u64) {
        if envelopes.is_empty() {
            return;
        }
        match Frame::from_envelopes(envelopes).and_then(|frame| frame.to_json().map_err(fl_core::Error::from)) {
            Ok(frame) => {
                // No receivers is fine: nobody else is connected
                let _ = self.inner.fanout.send(Relayed { origin, frame });
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode relayed frame"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Relayed> {
        self.inner.fanout.subscribe()
    }

    /// Number of items in the canonical table.
    #[cfg(test)]
    pub async fn item_count(&self) -> usize {
        self.inner.log.lock().await.len()
    }

    #[cfg(test)]
    pub async fn item(&self, id: &str) -> Option<SyncPush> {
        self.inner.log.lock().await.get(id).cloned()
    }
}
