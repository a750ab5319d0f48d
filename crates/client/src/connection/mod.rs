// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection management.
//!
//! [`ConnectionManager`] is a cheap handle to a single driver task. The task
//! exclusively owns the transport, the outbound batch queues, the heartbeat
//! bookkeeping and the pending push acknowledgements; callers talk to it
//! over a command channel and read state through atomics.

mod driver;
mod state;

pub use state::{ConnectionState, SharedConnectionState};

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fl_core::{ClockSource, Envelope, OfflineItem, Priority, SyncPush};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::RealtimeConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::health::{ConnectionMetrics, HealthMonitor};
use crate::router::{Filter, SubscriptionId, SubscriptionRouter};
use crate::store::OfflineStore;
use crate::sync::{ItemPusher, PushError};
use crate::transport::Transport;

use driver::Driver;

/// Capacity of the lifecycle broadcast channel. Slow observers lag and
/// skip events rather than block the driver.
const LIFECYCLE_CAPACITY: usize = 256;

/// Notification delivered to lifecycle observers.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    StateChanged { from: ConnectionState, to: ConnectionState },
    Connected,
    Disconnected { reason: String },
    Reconnecting { attempt: u32, delay: Duration },
    /// Reconnection gave up; a manual trigger is required.
    Offline { attempts: u32 },
    /// Connection restored after having been OFFLINE.
    Online,
    Error { kind: ErrorKind, message: String },
}

/// What happened to an envelope passed to [`ConnectionManager::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the batcher (or sent directly if CRITICAL).
    Queued,
    /// Not connected: saved to the offline store under this item id.
    Persisted(String),
    /// Not connected and not CRITICAL: discarded, counted as an error.
    Dropped,
}

pub(crate) enum Command {
    Connect { reply: oneshot::Sender<Result<()>> },
    Disconnect { reply: oneshot::Sender<()> },
    NetworkOnline,
    Enqueue(Envelope),
    Push { push: SyncPush, reply: oneshot::Sender<std::result::Result<(), PushError>> },
    Flush { reply: oneshot::Sender<()> },
    Shutdown,
}

struct Inner {
    config: RealtimeConfig,
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<SharedConnectionState>,
    health: Arc<HealthMonitor>,
    router: Arc<SubscriptionRouter>,
    store: Arc<OfflineStore>,
    clock: Arc<dyn ClockSource>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
    /// Cancels the transport open in flight. Replaced after each cancel.
    open_cancel: Arc<Mutex<CancellationToken>>,
}

/// Handle to the connection driver task.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Spawns the driver task on the current tokio runtime.
    ///
    /// The manager starts DISCONNECTED; call [`connect`](Self::connect).
    pub fn start<T: Transport>(
        config: RealtimeConfig,
        transport: T,
        store: Arc<OfflineStore>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (lifecycle, _) = broadcast::channel(LIFECYCLE_CAPACITY);
        let inner = Arc::new(Inner {
            state: Arc::new(SharedConnectionState::new()),
            health: Arc::new(HealthMonitor::new(config.max_missed_heartbeats)),
            router: Arc::new(SubscriptionRouter::new()),
            open_cancel: Arc::new(Mutex::new(CancellationToken::new())),
            config,
            commands,
            store,
            clock,
            lifecycle,
        });

        let driver = Driver::new(
            inner.config.clone(),
            transport,
            command_rx,
            Arc::clone(&inner.state),
            Arc::clone(&inner.health),
            Arc::clone(&inner.router),
            Arc::clone(&inner.store),
            Arc::clone(&inner.clock),
            inner.lifecycle.clone(),
            Arc::clone(&inner.open_cancel),
        );
        tokio::spawn(driver.run());

        ConnectionManager { inner }
    }

    fn command(&self, command: Command) -> Result<()> {
        self.inner.commands.send(command).map_err(|_| Error::Shutdown)
    }

    fn cancel_open(&self) {
        let mut token = self.inner.open_cancel.lock().unwrap_or_else(|e| e.into_inner());
        token.cancel();
        *token = CancellationToken::new();
    }

    fn emit(&self, event: LifecycleEvent) {
        let _ = self.inner.lifecycle.send(event);
    }

    /// Connects, resolving once CONNECTED or after reconnection gives up.
    pub async fn connect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Connect { reply })?;
        rx.await.map_err(|_| Error::Shutdown)?
    }

    /// Cancels timers and any open in flight, then closes the transport.
    pub async fn disconnect(&self) {
        self.cancel_open();
        let (reply, rx) = oneshot::channel();
        if self.command(Command::Disconnect { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Disconnects, waits the configured cooldown, then connects.
    pub async fn force_reconnect(&self) -> Result<()> {
        tracing::info!("forcing reconnect");
        self.disconnect().await;
        tokio::time::sleep(self.inner.config.force_reconnect_cooldown()).await;
        self.connect().await
    }

    /// Network-online signal: leaves OFFLINE, or retries a pending
    /// reconnection immediately.
    pub fn network_online(&self) -> Result<()> {
        self.command(Command::NetworkOnline)
    }

    /// Sends an envelope at `priority`.
    ///
    /// While not CONNECTED, CRITICAL envelopes are saved to the offline
    /// store and everything else is dropped.
    pub fn send(&self, mut envelope: Envelope, priority: Priority) -> SendOutcome {
        envelope.priority = priority;
        if self.state().is_connected() && self.command(Command::Enqueue(envelope.clone())).is_ok() {
            return SendOutcome::Queued;
        }

        if priority == Priority::Critical && !envelope.is_transient() {
            match self.inner.store.save_envelope(&envelope) {
                Ok(item) => {
                    tracing::debug!(id = %item.id, event_type = %envelope.event_type, "critical envelope persisted");
                    return SendOutcome::Persisted(item.id);
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to persist critical envelope");
                    self.emit(LifecycleEvent::Error { kind: ErrorKind::Store, message: e.to_string() });
                    return SendOutcome::Dropped;
                }
            }
        }

        self.inner.health.record_error();
        let err = Error::NotConnected;
        tracing::warn!(event_type = %envelope.event_type, %priority, "dropping envelope: {err}");
        self.emit(LifecycleEvent::Error { kind: err.kind(), message: err.to_string() });
        SendOutcome::Dropped
    }

    /// Sends `data` as a NORMAL priority envelope of `event_type`.
    pub fn publish(&self, event_type: &str, data: Value) -> SendOutcome {
        let envelope = Envelope::new(event_type, data, self.inner.clock.now_ms());
        self.send(envelope, Priority::Normal)
    }

    /// Flushes the batch queues now.
    pub async fn flush(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Flush { reply })?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    pub fn subscribe<F>(&self, event_type: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.router.subscribe(event_type, callback)
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
        self.inner.router.subscribe_filtered(event_type, filter, priority, callback)
    }

    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        self.inner.router.unsubscribe(id)
    }

    /// Registers a lifecycle observer.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.lifecycle.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    pub fn status_string(&self) -> String {
        self.inner.state.status_string()
    }

    pub fn metrics(&self) -> ConnectionMetrics {
        self.inner.health.snapshot()
    }

    pub fn router(&self) -> &Arc<SubscriptionRouter> {
        &self.inner.router
    }

    pub fn store(&self) -> &Arc<OfflineStore> {
        &self.inner.store
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    pub(crate) fn lifecycle_sender(&self) -> broadcast::Sender<LifecycleEvent> {
        self.inner.lifecycle.clone()
    }

    /// Stops the driver task without waiting. The driver closes the
    /// transport and cancels its timers on the way out.
    pub fn request_shutdown(&self) {
        self.cancel_open();
        let _ = self.command(Command::Shutdown);
    }

    /// Disconnects and stops the driver task.
    pub async fn shutdown(&self) {
        self.disconnect().await;
        let _ = self.command(Command::Shutdown);
    }
}

impl ItemPusher for ConnectionManager {
    fn push<'a>(
        &'a self,
        item: &'a OfflineItem,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<(), PushError>> + Send + 'a>> {
        Box::pin(async move {
            let (reply, rx) = oneshot::channel();
            self.command(Command::Push { push: SyncPush::from(item), reply })
                .map_err(|_| PushError::NotConnected)?;
            match tokio::time::timeout(self.inner.config.push_timeout(), rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(PushError::ConnectionLost),
                Err(_) => {
                    self.inner.health.record_error();
                    let err = Error::Timeout(format!("no sync_ack for {}", item.id));
                    self.emit(LifecycleEvent::Error { kind: err.kind(), message: err.to_string() });
                    Err(PushError::Timeout)
                }
            }
        })
    }

    fn is_online(&self) -> bool {
        self.state().is_connected()
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
