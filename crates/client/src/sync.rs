// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline item synchronization.
//!
//! A sync pass:
//! 1. Skips entirely unless the pusher is online
//! 2. Prunes items accepted by the previous pass
//! 3. Pushes every pending item in creation order
//! 4. Records failures; an item failing `max_retries` times becomes a
//!    conflict and is left alone until `retry_failed()` or
//!    `resolve_conflicts()`
//!
//! Passes never overlap: a pass requested while one runs is a no-op, except
//! through [`SyncEngine::request_sync`], which makes the running pass go
//! around once more. Items deleted while their push is in flight stay
//! deleted.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fl_core::{ClockSource, OfflineItem};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ConflictResolution, RealtimeConfig};
use crate::connection::LifecycleEvent;
use crate::error::{Error, Result};
use crate::store::OfflineStore;

/// Why a push did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    /// Nothing was sent; the item is not penalized.
    #[error("not connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("no acknowledgement before the push timeout")]
    Timeout,

    #[error("rejected by server: {0}")]
    Rejected(String),

    #[error("connection lost before acknowledgement")]
    ConnectionLost,
}

/// Delivers one offline item to the server.
pub trait ItemPusher: Send + Sync {
    /// Resolves once the server accepted or refused the item.
    fn push<'a>(
        &'a self,
        item: &'a OfflineItem,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<(), PushError>> + Send + 'a>>;

    fn is_online(&self) -> bool;
}

/// Outcome of one `sync_now()` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// True when the pass did not run (already syncing, or offline).
    pub skipped: bool,
    pub synced: usize,
    pub failed: usize,
    /// Items that became conflicts during this pass.
    pub conflicts: usize,
    /// Items from earlier passes removed from the store.
    pub pruned: usize,
}

impl SyncReport {
    fn skipped() -> Self {
        SyncReport { skipped: true, ..Default::default() }
    }

    fn absorb(&mut self, other: SyncReport) {
        self.synced += other.synced;
        self.failed += other.failed;
        self.conflicts += other.conflicts;
        self.pruned += other.pruned;
    }
}

/// Snapshot of sync progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    /// Wall clock ms of the last completed pass.
    pub last_sync: Option<u64>,
    pub pending_items: usize,
    pub failed_items: usize,
    pub total_items: usize,
}

struct EngineInner {
    store: Arc<OfflineStore>,
    pusher: Arc<dyn ItemPusher>,
    clock: Arc<dyn ClockSource>,
    max_retries: u32,
    default_resolution: ConflictResolution,
    sync_interval: Duration,
    syncing: AtomicBool,
    /// Set by `request_sync`; cleared when a pass starts listing items.
    rerun: AtomicBool,
    last_sync: Mutex<Option<u64>>,
    notifier: Option<broadcast::Sender<LifecycleEvent>>,
}

/// Clears the syncing flag when a pass ends, including by cancellation.
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Retry and conflict handling for offline items.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<OfflineStore>,
        pusher: Arc<dyn ItemPusher>,
        config: &RealtimeConfig,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        Self::build(store, pusher, config, clock, None)
    }

    /// Like [`new`](Self::new), reporting conflicts and store failures on
    /// the lifecycle channel.
    pub fn with_notifier(
        store: Arc<OfflineStore>,
        pusher: Arc<dyn ItemPusher>,
        config: &RealtimeConfig,
        clock: Arc<dyn ClockSource>,
        notifier: broadcast::Sender<LifecycleEvent>,
    ) -> Self {
        Self::build(store, pusher, config, clock, Some(notifier))
    }

    fn build(
        store: Arc<OfflineStore>,
        pusher: Arc<dyn ItemPusher>,
        config: &RealtimeConfig,
        clock: Arc<dyn ClockSource>,
        notifier: Option<broadcast::Sender<LifecycleEvent>>,
    ) -> Self {
        SyncEngine {
            inner: Arc::new(EngineInner {
                store,
                pusher,
                clock,
                max_retries: config.max_retries,
                default_resolution: config.conflict_resolution,
                sync_interval: config.sync_interval(),
                syncing: AtomicBool::new(false),
                rerun: AtomicBool::new(false),
                last_sync: Mutex::new(None),
                notifier,
            }),
        }
    }

    fn notify(&self, err: &Error) {
        if let Some(notifier) = &self.inner.notifier {
            let _ = notifier.send(LifecycleEvent::Error { kind: err.kind(), message: err.to_string() });
        }
    }

    /// Runs one sync pass, plus one more for every `request_sync` that
    /// arrived while it ran.
    pub async fn sync_now(&self) -> Result<SyncReport> {
        let mut report = self.pass().await?;
        while !report.skipped && self.inner.rerun.swap(false, Ordering::SeqCst) {
            let next = self.pass().await?;
            if next.skipped {
                break;
            }
            report.absorb(next);
        }
        Ok(report)
    }

    /// Asks for a pass soon. Starts one unless a pass is running, in which
    /// case that pass repeats once it is done.
    pub fn request_sync(&self) {
        self.inner.rerun.store(true, Ordering::SeqCst);
        if self.is_syncing() {
            tracing::debug!("sync running, follow-up pass requested");
            return;
        }
        let engine = self.clone();
        tokio::spawn(async move { engine.run_pass("request").await });
    }

    async fn pass(&self) -> Result<SyncReport> {
        if self.inner.syncing.swap(true, Ordering::SeqCst) {
            tracing::debug!("sync already in progress");
            return Ok(SyncReport::skipped());
        }
        let _guard = SyncingGuard(&self.inner.syncing);

        if !self.inner.pusher.is_online() {
            tracing::debug!("skipping sync while offline");
            return Ok(SyncReport::skipped());
        }

        // Everything saved before this point is covered by the listing below
        self.inner.rerun.store(false, Ordering::SeqCst);
        let mut report = SyncReport { pruned: self.inner.store.prune_synced()?, ..Default::default() };
        let pending: Vec<OfflineItem> =
            self.inner.store.list(None)?.into_iter().filter(OfflineItem::is_pending).collect();

        for mut item in pending {
            match self.inner.pusher.push(&item).await {
                Ok(()) => {
                    item.mark_synced();
                    if !self.inner.store.update(&item)? {
                        tracing::debug!(id = %item.id, "item deleted during its push");
                    }
                    report.synced += 1;
                }
                Err(PushError::NotConnected) => {
                    tracing::debug!("connection dropped, ending sync pass");
                    break;
                }
                Err(e) => {
                    let became_conflict = item.record_failure(self.inner.max_retries, e.to_string());
                    if !self.inner.store.update(&item)? {
                        tracing::debug!(id = %item.id, error = %e, "item deleted during its failed push");
                        continue;
                    }
                    report.failed += 1;
                    if became_conflict {
                        report.conflicts += 1;
                        let err = Error::SyncConflict { id: item.id.clone(), retries: item.retry_count };
                        tracing::warn!("{err}");
                        self.notify(&err);
                    } else {
                        tracing::debug!(id = %item.id, retry = item.retry_count, error = %e, "push failed");
                    }
                }
            }
        }

        *self.inner.last_sync.lock().unwrap_or_else(|e| e.into_inner()) = Some(self.inner.clock.now_ms());
        if report.synced + report.failed > 0 {
            tracing::info!(
                synced = report.synced,
                failed = report.failed,
                conflicts = report.conflicts,
                "sync pass complete"
            );
        }
        Ok(report)
    }

    /// Gives every conflicted item a fresh retry budget, then syncs.
    pub async fn retry_failed(&self) -> Result<SyncReport> {
        let mut conflicted = self.conflicted()?;
        for item in &mut conflicted {
            item.reset_retries();
        }
        let count = self.inner.store.update_many(&conflicted)?;
        tracing::info!(count, "retrying conflicted items");
        self.sync_now().await
    }

    /// Applies `resolution` (or the configured default) to every conflicted
    /// item. Returns the number of items affected.
    pub fn resolve_conflicts(&self, resolution: Option<ConflictResolution>) -> Result<usize> {
        let resolution = resolution.unwrap_or(self.inner.default_resolution);
        let mut conflicted = self.conflicted()?;
        let affected = match resolution {
            ConflictResolution::Server => {
                let mut deleted = 0;
                for item in &conflicted {
                    if self.inner.store.delete(&item.id)? {
                        deleted += 1;
                    }
                }
                deleted
            }
            ConflictResolution::Client => {
                for item in &mut conflicted {
                    item.clear_conflict();
                }
                self.inner.store.update_many(&conflicted)?
            }
            ConflictResolution::Manual => 0,
        };
        tracing::info!(%resolution, affected, "conflicts resolved");
        Ok(affected)
    }

    fn conflicted(&self) -> Result<Vec<OfflineItem>> {
        Ok(self.inner.store.list(None)?.into_iter().filter(|item| item.conflict).collect())
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::SeqCst)
    }

    pub fn last_sync(&self) -> Option<u64> {
        *self.inner.last_sync.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> Result<SyncStatus> {
        let stats = self.inner.store.stats()?;
        Ok(SyncStatus {
            is_online: self.inner.pusher.is_online(),
            is_syncing: self.is_syncing(),
            last_sync: self.last_sync(),
            pending_items: stats.pending,
            failed_items: stats.failed,
            total_items: stats.total,
        })
    }

    async fn run_pass(&self, trigger: &str) {
        match self.sync_now().await {
            Ok(report) if !report.skipped => {
                tracing::debug!(trigger, synced = report.synced, "sync pass finished");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(trigger, error = %e, "sync pass failed");
                self.notify(&e);
            }
        }
    }

    /// Spawns the background loop: one pass every sync interval and one on
    /// every transition into CONNECTED.
    ///
    /// Cancelling `cancel` lets an in-flight pass finish, then stops.
    pub fn spawn(
        &self,
        mut lifecycle: broadcast::Receiver<LifecycleEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let period = engine.inner.sync_interval;
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => engine.run_pass("interval").await,
                    event = lifecycle.recv() => match event {
                        Ok(LifecycleEvent::Connected) => engine.run_pass("connected").await,
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "sync loop lagged behind lifecycle events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            tracing::debug!("sync loop stopped");
        })
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
