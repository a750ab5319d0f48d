// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client facade wiring the connection manager, offline store and sync
//! engine together.

use std::sync::{Arc, Mutex};

use fl_core::{ClockSource, Envelope, OfflineItem, Priority, SystemClock};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ConflictResolution, RealtimeConfig};
use crate::connection::{ConnectionManager, ConnectionState, LifecycleEvent, SendOutcome};
use crate::error::Result;
use crate::health::ConnectionMetrics;
use crate::router::{Filter, SubscriptionId};
use crate::store::{OfflineStore, StoreStats};
use crate::sync::{SyncEngine, SyncReport, SyncStatus};
use crate::transport::{Transport, WebSocketTransport};

struct SyncLoop {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Real-time client for one dashboard.
///
/// Construct with [`from_config`](Self::from_config) (WebSocket transport,
/// SQLite store when `storePath` is set) or [`new`](Self::new) to inject
/// the transport, store and clock. Nothing happens on the network until
/// [`start`](Self::start).
pub struct RealtimeClient {
    manager: ConnectionManager,
    sync: SyncEngine,
    sync_loop: Mutex<Option<SyncLoop>>,
}

impl RealtimeClient {
    /// Builds a client around an injected transport, store and clock.
    ///
    /// Must be called inside a tokio runtime: the connection driver task is
    /// spawned immediately.
    pub fn new<T: Transport>(
        config: RealtimeConfig,
        transport: T,
        store: Arc<OfflineStore>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        let manager = ConnectionManager::start(config, transport, Arc::clone(&store), Arc::clone(&clock));
        let sync = SyncEngine::with_notifier(
            store,
            Arc::new(manager.clone()),
            manager.config(),
            clock,
            manager.lifecycle_sender(),
        );
        RealtimeClient { manager, sync, sync_loop: Mutex::new(None) }
    }

    /// Builds a client from configuration alone.
    pub fn from_config(config: RealtimeConfig) -> Result<Self> {
        config.validate()?;
        let clock: Arc<dyn ClockSource> = Arc::new(SystemClock);
        let store = match &config.store_path {
            Some(path) => OfflineStore::open(path, Arc::clone(&clock))?,
            None => OfflineStore::in_memory(Arc::clone(&clock)),
        };
        Ok(Self::new(config, WebSocketTransport::new(), Arc::new(store), clock))
    }

    /// Starts the background sync loop and connects.
    ///
    /// The sync loop keeps running when the connection gives up, so a later
    /// [`network_online`](Self::network_online) or
    /// [`force_reconnect`](Self::force_reconnect) resumes syncing.
    pub async fn start(&self) -> Result<()> {
        {
            let mut sync_loop = self.lock_sync_loop();
            if sync_loop.is_none() {
                let cancel = CancellationToken::new();
                let task = self.sync.spawn(self.manager.subscribe_lifecycle(), cancel.clone());
                *sync_loop = Some(SyncLoop { cancel, task });
            }
        }
        tracing::info!(url = %self.manager.config().url, "starting realtime client");
        self.manager.connect().await
    }

    /// Stops syncing, disconnects and drops every subscription.
    ///
    /// An in-flight sync pass finishes first. The client can be started
    /// again afterwards.
    pub async fn stop(&self) {
        let sync_loop = self.lock_sync_loop().take();
        if let Some(SyncLoop { cancel, task }) = sync_loop {
            cancel.cancel();
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "sync loop ended abnormally");
            }
        }
        self.manager.disconnect().await;
        self.manager.router().close();
        tracing::info!("realtime client stopped");
    }

    fn lock_sync_loop(&self) -> std::sync::MutexGuard<'_, Option<SyncLoop>> {
        self.sync_loop.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe<F>(&self, event_type: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.manager.subscribe(event_type, callback)
    }

    pub fn subscribe_filtered<F>(
        &self,
        event_type: &str,
        filter: Option<Filter>,
        priority: Priority,
        callback: F,
    ) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.manager.subscribe_filtered(event_type, filter, priority, callback)
    }

    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        self.manager.unsubscribe(id)
    }

    pub fn send(&self, envelope: Envelope, priority: Priority) -> SendOutcome {
        self.manager.send(envelope, priority)
    }

    pub fn publish(&self, event_type: &str, data: Value) -> SendOutcome {
        self.manager.publish(event_type, data)
    }

    /// Saves a change to the offline store. When connected, a sync pass is
    /// requested so the change goes out right away, even if a pass is
    /// already running.
    pub fn write(&self, item_type: &str, payload: Value) -> Result<OfflineItem> {
        let item = self.manager.store().save(item_type, payload)?;
        if self.manager.state().is_connected() {
            self.sync.request_sync();
        }
        Ok(item)
    }

    pub async fn sync_now(&self) -> Result<SyncReport> {
        self.sync.sync_now().await
    }

    pub async fn retry_failed(&self) -> Result<SyncReport> {
        self.sync.retry_failed().await
    }

    /// Resolves conflicted items; `None` applies the configured strategy.
    pub fn resolve_conflicts(&self, resolution: Option<ConflictResolution>) -> Result<usize> {
        self.sync.resolve_conflicts(resolution)
    }

    pub fn sync_status(&self) -> Result<SyncStatus> {
        self.sync.status()
    }

    pub fn store_stats(&self) -> Result<StoreStats> {
        Ok(self.manager.store().stats()?)
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn metrics(&self) -> ConnectionMetrics {
        self.manager.metrics()
    }

    pub async fn force_reconnect(&self) -> Result<()> {
        self.manager.force_reconnect().await
    }

    pub fn network_online(&self) -> Result<()> {
        self.manager.network_online()
    }

    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.manager.subscribe_lifecycle()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn sync_engine(&self) -> &SyncEngine {
        &self.sync
    }

    pub fn store(&self) -> &Arc<OfflineStore> {
        self.manager.store()
    }
}

/// Stops the sync loop and the connection driver, closing the transport.
impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if let Some(sync_loop) = self.lock_sync_loop().take() {
            sync_loop.cancel.cancel();
        }
        self.manager.request_shutdown();
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
