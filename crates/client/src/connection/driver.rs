// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The connection driver task.
//!
//! One `tokio::select!` loop multiplexes caller commands, inbound frames and
//! three optional deadlines (batch flush, heartbeat, reconnect backoff).
//! Every deadline is `None` unless the state calls for it, so DISCONNECTED
//! and OFFLINE arm nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use fl_core::protocol::{PING, PONG, SYNC_ACK, SYNC_PUSH};
use fl_core::{ClockSource, Envelope, Frame, Heartbeat, SyncAck, SyncPush};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{Command, ConnectionState, LifecycleEvent, SharedConnectionState};
use crate::batcher::{into_frames, Admission, PriorityBatcher};
use crate::config::RealtimeConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::health::HealthMonitor;
use crate::router::SubscriptionRouter;
use crate::store::OfflineStore;
use crate::sync::PushError;
use crate::transport::{Transport, TransportError, TransportResult};

type PushReply = oneshot::Sender<std::result::Result<(), PushError>>;

enum OpenOutcome {
    Opened,
    Failed(String),
    Cancelled,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

pub(super) struct Driver<T: Transport> {
    config: RealtimeConfig,
    transport: T,
    commands: mpsc::UnboundedReceiver<Command>,
    shared: Arc<SharedConnectionState>,
    health: Arc<HealthMonitor>,
    router: Arc<SubscriptionRouter>,
    store: Arc<OfflineStore>,
    clock: Arc<dyn ClockSource>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
    open_cancel: Arc<Mutex<CancellationToken>>,

    state: ConnectionState,
    attempt: u32,
    was_offline: bool,
    batcher: PriorityBatcher,
    flush_at: Option<Instant>,
    next_heartbeat: Option<Instant>,
    reconnect_at: Option<Instant>,
    /// Ping awaiting its pong: (id, send time).
    outstanding_ping: Option<(u64, Instant)>,
    next_ping_id: u64,
    pending_acks: HashMap<String, PushReply>,
    connect_waiters: Vec<oneshot::Sender<Result<()>>>,
}

impl<T: Transport> Driver<T> {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        config: RealtimeConfig,
        transport: T,
        commands: mpsc::UnboundedReceiver<Command>,
        shared: Arc<SharedConnectionState>,
        health: Arc<HealthMonitor>,
        router: Arc<SubscriptionRouter>,
        store: Arc<OfflineStore>,
        clock: Arc<dyn ClockSource>,
        lifecycle: broadcast::Sender<LifecycleEvent>,
        open_cancel: Arc<Mutex<CancellationToken>>,
    ) -> Self {
        let batcher = PriorityBatcher::new(config.batch_size);
        Driver {
            config,
            transport,
            commands,
            shared,
            health,
            router,
            store,
            clock,
            lifecycle,
            open_cancel,
            state: ConnectionState::Disconnected,
            attempt: 0,
            was_offline: false,
            batcher,
            flush_at: None,
            next_heartbeat: None,
            reconnect_at: None,
            outstanding_ping: None,
            next_ping_id: 1,
            pending_acks: HashMap::new(),
            connect_waiters: Vec::new(),
        }
    }

    pub(super) async fn run(mut self) {
        loop {
            let connected = self.state.is_connected();
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => {
                        self.go_disconnected("shutdown").await;
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                },

                frame = self.transport.recv(), if connected => self.handle_inbound(frame).await,

                _ = sleep_until_opt(self.flush_at) => self.flush().await,

                _ = sleep_until_opt(self.next_heartbeat) => self.heartbeat_tick().await,

                _ = sleep_until_opt(self.reconnect_at) => self.reconnect_tick().await,
            }
        }
        tracing::debug!("connection driver stopped");
    }

    fn emit(&self, event: LifecycleEvent) {
        let _ = self.lifecycle.send(event);
    }

    fn emit_error(&self, kind: ErrorKind, message: impl Into<String>) {
        self.emit(LifecycleEvent::Error { kind, message: message.into() });
    }

    /// Moves to `to` if the edge is legal. Illegal requests are refused.
    fn transition(&mut self, to: ConnectionState) -> bool {
        let from = self.state;
        if !from.can_transition_to(to) {
            tracing::warn!(%from, %to, "refusing illegal connection state transition");
            return false;
        }
        self.state = to;
        self.shared.set(to);
        tracing::info!(%from, %to, "connection state changed");
        self.emit(LifecycleEvent::StateChanged { from, to });
        true
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => match self.state {
                ConnectionState::Connected => {
                    let _ = reply.send(Ok(()));
                }
                ConnectionState::Connecting | ConnectionState::Reconnecting => {
                    self.connect_waiters.push(reply);
                }
                ConnectionState::Disconnected | ConnectionState::Offline => {
                    self.connect_waiters.push(reply);
                    self.begin_connect().await;
                }
            },
            Command::Disconnect { reply } => {
                self.go_disconnected("disconnect requested").await;
                let _ = reply.send(());
            }
            Command::NetworkOnline => match self.state {
                ConnectionState::Offline => {
                    tracing::info!("network online, leaving offline mode");
                    self.begin_connect().await;
                }
                ConnectionState::Reconnecting => {
                    self.reconnect_at = Some(Instant::now());
                }
                _ => {}
            },
            Command::Enqueue(envelope) => self.enqueue(envelope).await,
            Command::Push { push, reply } => self.push(push, reply).await,
            Command::Flush { reply } => {
                self.flush().await;
                let _ = reply.send(());
            }
            // Handled by the run loop
            Command::Shutdown => {}
        }
    }

    async fn open(&mut self) -> OpenOutcome {
        let token = self.open_cancel.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let timeout = self.config.connect_timeout();
        let url = self.config.url.clone();
        tokio::select! {
            _ = token.cancelled() => OpenOutcome::Cancelled,
            result = tokio::time::timeout(timeout, self.transport.connect(&url)) => match result {
                Ok(Ok(())) => OpenOutcome::Opened,
                Ok(Err(e)) => OpenOutcome::Failed(e.to_string()),
                Err(_) => OpenOutcome::Failed(Error::Timeout(format!("connect to {url}")).to_string()),
            },
        }
    }

    async fn begin_connect(&mut self) {
        if !self.transition(ConnectionState::Connecting) {
            return;
        }
        self.attempt = 0;
        self.shared.set_attempt(0);
        match self.open().await {
            OpenOutcome::Opened => self.on_opened(),
            OpenOutcome::Failed(reason) => {
                self.on_open_failed(&reason);
                self.schedule_reconnect(1);
            }
            // The disconnect command that cancelled us is next in the queue
            OpenOutcome::Cancelled => {}
        }
    }

    async fn reconnect_tick(&mut self) {
        self.reconnect_at = None;
        if self.state != ConnectionState::Reconnecting {
            return;
        }
        let attempt = self.attempt;
        tracing::debug!(attempt, "reconnection attempt");
        match self.open().await {
            OpenOutcome::Opened => self.on_opened(),
            OpenOutcome::Failed(reason) => {
                self.on_open_failed(&reason);
                self.schedule_reconnect(attempt.saturating_add(1));
            }
            OpenOutcome::Cancelled => {}
        }
    }

    fn on_open_failed(&mut self, reason: &str) {
        self.health.record_error();
        let err = Error::Transport(TransportError::ConnectionFailed(reason.to_string()));
        tracing::warn!("{err}");
        self.emit_error(err.kind(), err.to_string());
    }

    fn on_opened(&mut self) {
        if !self.transition(ConnectionState::Connected) {
            return;
        }
        self.attempt = 0;
        self.shared.set_attempt(0);
        self.health.mark_connected();
        self.outstanding_ping = None;
        self.next_heartbeat = self.config.heartbeat_interval().map(|every| Instant::now() + every);
        self.emit(LifecycleEvent::Connected);
        if self.was_offline {
            self.was_offline = false;
            self.emit(LifecycleEvent::Online);
        }
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
    }

    /// Arms the backoff timer for `attempt`, or goes OFFLINE when the
    /// attempt budget is spent.
    fn schedule_reconnect(&mut self, attempt: u32) {
        if attempt > self.config.max_reconnect_attempts {
            self.go_offline();
            return;
        }
        if self.state != ConnectionState::Reconnecting && !self.transition(ConnectionState::Reconnecting)
        {
            return;
        }
        let delay = self.config.backoff_delay(attempt);
        self.attempt = attempt;
        self.shared.set_attempt(attempt);
        self.health.set_reconnect_attempt(attempt);
        self.reconnect_at = Some(Instant::now() + delay);
        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
        self.emit(LifecycleEvent::Reconnecting { attempt, delay });
    }

    fn go_offline(&mut self) {
        self.reconnect_at = None;
        if !self.transition(ConnectionState::Offline) {
            return;
        }
        let attempts = self.attempt;
        self.was_offline = true;
        self.health.mark_disconnected();
        let err = Error::ReconnectExhausted { attempts };
        tracing::warn!("{err}");
        self.emit(LifecycleEvent::Offline { attempts });
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(Error::ReconnectExhausted { attempts }));
        }
    }

    /// Tears down a connection that broke underneath us.
    async fn on_connection_lost(&mut self, reason: &str) {
        if !self.state.is_connected() {
            return;
        }
        tracing::warn!(reason, "connection lost");
        self.close_transport().await;
        self.health.mark_disconnected();
        self.emit(LifecycleEvent::Disconnected { reason: reason.to_string() });
        self.schedule_reconnect(1);
    }

    /// Explicit teardown: cancels every timer and lands in DISCONNECTED.
    async fn go_disconnected(&mut self, reason: &str) {
        self.reconnect_at = None;
        let was_connected = self.state.is_connected();
        self.close_transport().await;
        if self.state != ConnectionState::Disconnected {
            self.transition(ConnectionState::Disconnected);
        }
        self.attempt = 0;
        self.shared.set_attempt(0);
        self.health.mark_disconnected();
        if was_connected {
            self.emit(LifecycleEvent::Disconnected { reason: reason.to_string() });
        }
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(Error::Disconnected));
        }
    }

    /// Closes the transport and releases everything tied to it: heartbeat
    /// and flush timers, queued envelopes (spilled to the store) and
    /// pending push acknowledgements.
    async fn close_transport(&mut self) {
        self.next_heartbeat = None;
        self.outstanding_ping = None;
        self.flush_at = None;
        if self.transport.is_connected() {
            if let Err(e) = self.transport.disconnect().await {
                tracing::debug!(error = %e, "transport close failed");
            }
        }
        for envelope in self.batcher.drain_persistable() {
            self.persist(&envelope);
        }
        for (_, reply) in self.pending_acks.drain() {
            let _ = reply.send(Err(PushError::ConnectionLost));
        }
    }

    fn persist(&self, envelope: &Envelope) {
        match self.store.save_envelope(envelope) {
            Ok(item) => {
                tracing::debug!(id = %item.id, event_type = %envelope.event_type, "envelope saved offline")
            }
            Err(e) => {
                tracing::error!(error = %e, event_type = %envelope.event_type, "failed to save envelope offline");
                self.emit_error(ErrorKind::Store, e.to_string());
            }
        }
    }

    async fn enqueue(&mut self, envelope: Envelope) {
        match self.batcher.admit(envelope, self.state.is_connected()) {
            Admission::Bypass(envelope) => {
                self.send_frames(vec![Frame::from(envelope)]).await;
            }
            Admission::Queued { flush: true } => self.flush().await,
            Admission::Queued { flush: false } => {
                if self.flush_at.is_none() {
                    self.flush_at = Some(Instant::now() + self.config.batch_timeout());
                }
            }
            Admission::Offline(envelope) => self.persist(&envelope),
            Admission::Dropped => tracing::debug!("dropping transient envelope while offline"),
        }
    }

    async fn flush(&mut self) {
        self.flush_at = None;
        let envelopes = if self.state.is_connected() {
            self.batcher.drain()
        } else {
            self.batcher.drain_persistable()
        };
        if envelopes.is_empty() {
            return;
        }
        if !self.state.is_connected() {
            for envelope in &envelopes {
                self.persist(envelope);
            }
            return;
        }
        tracing::debug!(count = envelopes.len(), "flushing batch");
        let frames = into_frames(envelopes, self.config.max_frame_envelopes);
        self.send_frames(frames).await;
    }

    /// Sends frames in order. On the first failure the unsent envelopes are
    /// saved offline and the connection is treated as lost.
    ///
    /// Returns true if every frame was sent.
    async fn send_frames(&mut self, frames: Vec<Frame>) -> bool {
        let mut frames = frames.into_iter();
        while let Some(frame) = frames.next() {
            let text = match frame.to_json() {
                Ok(text) => text,
                Err(e) => {
                    self.health.record_error();
                    self.emit_error(ErrorKind::Protocol, e.to_string());
                    continue;
                }
            };
            let bytes = text.len();
            match self.transport.send(text).await {
                Ok(()) => self.health.record_sent(bytes, frame.len()),
                Err(e) => {
                    self.health.record_error();
                    let err = Error::Transport(e);
                    self.emit_error(err.kind(), err.to_string());
                    for envelope in std::iter::once(frame).chain(frames.by_ref()).flat_map(Frame::into_envelopes) {
                        if !envelope.is_transient() {
                            self.persist(&envelope);
                        }
                    }
                    self.on_connection_lost(&err.to_string()).await;
                    return false;
                }
            }
        }
        true
    }

    async fn push(&mut self, push: SyncPush, reply: PushReply) {
        if !self.state.is_connected() {
            let _ = reply.send(Err(PushError::NotConnected));
            return;
        }
        let id = push.id.clone();
        let envelope = match push.into_envelope(self.clock.now_ms()) {
            Ok(envelope) => envelope,
            Err(e) => {
                let _ = reply.send(Err(PushError::Transport(e.to_string())));
                return;
            }
        };
        // Abandoned (timed out) pushes leave closed senders behind
        self.pending_acks.retain(|_, waiting| !waiting.is_closed());
        self.pending_acks.insert(id.clone(), reply);
        if !self.send_frames(vec![Frame::from(envelope)]).await {
            if let Some(reply) = self.pending_acks.remove(&id) {
                let _ = reply.send(Err(PushError::Transport("send failed".to_string())));
            }
        }
    }

    async fn heartbeat_tick(&mut self) {
        let Some(every) = self.config.heartbeat_interval() else {
            self.next_heartbeat = None;
            return;
        };
        if !self.state.is_connected() {
            self.next_heartbeat = None;
            return;
        }
        if let Some((id, _)) = self.outstanding_ping.take() {
            let limit_reached = self.health.record_missed_heartbeat();
            let err = Error::Timeout(format!("no pong for heartbeat {id}"));
            tracing::warn!("{err}");
            self.emit_error(err.kind(), err.to_string());
            if limit_reached {
                self.on_connection_lost("missed heartbeats").await;
                return;
            }
        }
        let id = self.next_ping_id;
        self.next_ping_id = self.next_ping_id.wrapping_add(1);
        self.outstanding_ping = Some((id, Instant::now()));
        self.next_heartbeat = Some(Instant::now() + every);
        self.send_frames(vec![Frame::from(Envelope::ping(id, self.clock.now_ms()))]).await;
    }

    async fn handle_inbound(&mut self, frame: TransportResult<Option<String>>) {
        let text = match frame {
            Ok(Some(text)) => text,
            Ok(None) => {
                self.on_connection_lost("closed by server").await;
                return;
            }
            Err(e) => {
                self.health.record_error();
                self.on_connection_lost(&e.to_string()).await;
                return;
            }
        };
        self.health.record_received(text.len());
        let frame = match Frame::from_json(&text) {
            Ok(frame) => frame,
            Err(e) => {
                self.health.record_error();
                let err = Error::Protocol(fl_core::Error::MalformedFrame(e.to_string()));
                tracing::warn!("{err}");
                self.emit_error(err.kind(), err.to_string());
                return;
            }
        };
        for envelope in frame.into_envelopes() {
            self.handle_envelope(envelope).await;
        }
    }

    async fn handle_envelope(&mut self, envelope: Envelope) {
        match envelope.event_type.as_str() {
            PING => match Heartbeat::from_envelope(&envelope) {
                Ok(ping) => {
                    let pong = Envelope::pong(ping.id, self.clock.now_ms());
                    self.send_frames(vec![Frame::from(pong)]).await;
                }
                Err(e) => self.protocol_error(e),
            },
            PONG => match Heartbeat::from_envelope(&envelope) {
                Ok(pong) => match self.outstanding_ping.as_ref().copied() {
                    Some((id, sent)) if id == pong.id => {
                        self.outstanding_ping = None;
                        self.health.record_latency(sent.elapsed().as_millis() as u64);
                        self.health.heartbeat_ok();
                    }
                    _ => tracing::debug!(id = pong.id, "ignoring stale pong"),
                },
                Err(e) => self.protocol_error(e),
            },
            SYNC_ACK => match SyncAck::from_envelope(&envelope) {
                Ok(ack) => match self.pending_acks.remove(&ack.id) {
                    Some(reply) => {
                        let result = if ack.accepted {
                            Ok(())
                        } else {
                            Err(PushError::Rejected(ack.reason.unwrap_or_else(|| "rejected".to_string())))
                        };
                        let _ = reply.send(result);
                    }
                    None => tracing::debug!(id = %ack.id, "ack for unknown push"),
                },
                Err(e) => self.protocol_error(e),
            },
            SYNC_PUSH => tracing::debug!("ignoring sync_push sent to a client"),
            _ => {
                let report = self.router.dispatch(&envelope);
                for _ in 0..report.failed {
                    self.emit_error(
                        ErrorKind::Subscriber,
                        format!("subscriber of {} panicked", envelope.event_type),
                    );
                }
            }
        }
    }

    fn protocol_error(&self, e: fl_core::Error) {
        self.health.record_error();
        let err = Error::Protocol(e);
        tracing::warn!("{err}");
        self.emit_error(err.kind(), err.to_string());
    }
}
