// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Mock transport shared by the connection, sync and client tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use fl_core::protocol::{SYNC_ACK, SYNC_PUSH};
use fl_core::{Envelope, Frame, Heartbeat, SyncAck, SyncPush};
use tokio::sync::mpsc;

use crate::transport::{Transport, TransportError, TransportFuture};

/// How the scripted server answers `sync_push` envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckMode {
    AcceptAll,
    RejectAll(String),
    /// Never answer, so pushes time out.
    Silent,
}

struct ServerState {
    sent: Vec<String>,
    connects: u32,
    fail_next_connects: u32,
    always_fail: bool,
    hang_connect: bool,
    fail_sends: bool,
    auto_pong: bool,
    ack_mode: AckMode,
    inbox: Option<mpsc::UnboundedSender<Option<String>>>,
}

/// Server side of a [`MockTransport`].
///
/// Cloned handles share state, so a test keeps one while the transport is
/// moved into the connection manager.
#[derive(Clone)]
pub struct MockServer {
    state: Arc<Mutex<ServerState>>,
}

impl MockServer {
    pub fn new() -> Self {
        MockServer {
            state: Arc::new(Mutex::new(ServerState {
                sent: Vec::new(),
                connects: 0,
                fail_next_connects: 0,
                always_fail: false,
                hang_connect: false,
                fail_sends: false,
                auto_pong: true,
                ack_mode: AckMode::AcceptAll,
                inbox: None,
            })),
        }
    }

    /// Creates a transport wired to this server.
    pub fn transport(&self) -> MockTransport {
        MockTransport { server: self.clone(), inbox: None }
    }

    /// Delivers an envelope to the connected client.
    pub fn push(&self, envelope: Envelope) {
        self.push_raw(Frame::from(envelope).to_json().unwrap());
    }

    /// Delivers raw text to the connected client.
    pub fn push_raw(&self, text: impl Into<String>) {
        let state = self.state.lock().unwrap();
        if let Some(inbox) = &state.inbox {
            let _ = inbox.send(Some(text.into()));
        }
    }

    /// Closes the current connection from the server side.
    pub fn drop_connection(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(inbox) = state.inbox.take() {
            let _ = inbox.send(None);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().inbox.is_some()
    }

    pub fn connect_count(&self) -> u32 {
        self.state.lock().unwrap().connects
    }

    pub fn fail_next_connects(&self, count: u32) {
        self.state.lock().unwrap().fail_next_connects = count;
    }

    pub fn set_always_fail(&self, fail: bool) {
        self.state.lock().unwrap().always_fail = fail;
    }

    /// Makes `connect()` pend forever.
    pub fn set_hang_connect(&self, hang: bool) {
        self.state.lock().unwrap().hang_connect = hang;
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().unwrap().fail_sends = fail;
    }

    pub fn set_auto_pong(&self, enabled: bool) {
        self.state.lock().unwrap().auto_pong = enabled;
    }

    pub fn set_ack_mode(&self, mode: AckMode) {
        self.state.lock().unwrap().ack_mode = mode;
    }

    /// Raw frames sent by the client, in order.
    pub fn sent_frames(&self) -> Vec<String> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Envelopes sent by the client, flattened across frames.
    pub fn sent_envelopes(&self) -> Vec<Envelope> {
        self.sent_frames()
            .iter()
            .flat_map(|text| Frame::from_json(text).unwrap().into_envelopes())
            .collect()
    }

    /// Types of the sent envelopes, skipping heartbeats.
    pub fn sent_types(&self) -> Vec<String> {
        self.sent_envelopes()
            .into_iter()
            .filter(|e| !e.is_heartbeat())
            .map(|e| e.event_type)
            .collect()
    }

    pub fn sent_pushes(&self) -> Vec<SyncPush> {
        self.sent_envelopes()
            .iter()
            .filter(|e| e.event_type == SYNC_PUSH)
            .map(|e| SyncPush::from_envelope(e).unwrap())
            .collect()
    }

    pub fn clear_sent(&self) {
        self.state.lock().unwrap().sent.clear();
    }

    fn accept_frame(&self, text: String) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_sends {
            return Err(TransportError::SendFailed("mock send failure".into()));
        }
        let replies: Vec<String> = match Frame::from_json(&text) {
            Ok(frame) => frame
                .into_envelopes()
                .iter()
                .filter_map(|envelope| scripted_reply(&state, envelope))
                .collect(),
            Err(_) => Vec::new(),
        };
        state.sent.push(text);
        if let Some(inbox) = &state.inbox {
            for reply in replies {
                let _ = inbox.send(Some(reply));
            }
        }
        Ok(())
    }
}

fn scripted_reply(state: &ServerState, envelope: &Envelope) -> Option<String> {
    if envelope.event_type == fl_core::protocol::PING && state.auto_pong {
        let ping = Heartbeat::from_envelope(envelope).ok()?;
        return Envelope::pong(ping.id, envelope.timestamp).to_json().ok();
    }
    if envelope.event_type == SYNC_PUSH {
        let push = SyncPush::from_envelope(envelope).ok()?;
        let ack = match &state.ack_mode {
            AckMode::AcceptAll => SyncAck::accepted(push.id),
            AckMode::RejectAll(reason) => SyncAck::rejected(push.id, reason.clone()),
            AckMode::Silent => return None,
        };
        let reply = ack.into_envelope(envelope.timestamp).ok()?;
        debug_assert_eq!(reply.event_type, SYNC_ACK);
        return reply.to_json().ok();
    }
    None
}

/// Mock transport for testing without real sockets.
pub struct MockTransport {
    server: MockServer,
    inbox: Option<mpsc::UnboundedReceiver<Option<String>>>,
}

impl Transport for MockTransport {
    fn connect(&mut self, _url: &str) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let hang = {
                let mut state = self.server.state.lock().unwrap();
                state.connects += 1;
                if state.always_fail {
                    return Err(TransportError::ConnectionFailed("mock failure".into()));
                }
                if state.fail_next_connects > 0 {
                    state.fail_next_connects -= 1;
                    return Err(TransportError::ConnectionFailed("mock failure".into()));
                }
                state.hang_connect
            };
            if hang {
                std::future::pending::<()>().await;
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.server.state.lock().unwrap().inbox = Some(tx);
            self.inbox = Some(rx);
            Ok(())
        })
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.inbox = None;
            self.server.state.lock().unwrap().inbox = None;
            Ok(())
        })
    }

    fn send(&mut self, frame: String) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if self.inbox.is_none() {
                return Err(TransportError::ConnectionClosed);
            }
            self.server.accept_frame(frame)
        })
    }

    fn recv(&mut self) -> TransportFuture<'_, Option<String>> {
        Box::pin(async move {
            let inbox = self.inbox.as_mut().ok_or(TransportError::ConnectionClosed)?;
            match inbox.recv().await {
                Some(Some(text)) => Ok(Some(text)),
                Some(None) | None => {
                    self.inbox = None;
                    Ok(None)
                }
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.inbox.is_some()
    }
}

#[tokio::test]
async fn test_mock_transport_connect() {
    let server = MockServer::new();
    let mut transport = server.transport();
    assert!(!transport.is_connected());

    transport.connect("ws://localhost:1234").await.unwrap();
    assert!(transport.is_connected());
    assert!(server.is_connected());
    assert_eq!(server.connect_count(), 1);

    transport.disconnect().await.unwrap();
    assert!(!transport.is_connected());
    assert!(!server.is_connected());
}

#[tokio::test]
async fn test_mock_transport_send_recv() {
    let server = MockServer::new();
    let mut transport = server.transport();
    transport.connect("ws://localhost:1234").await.unwrap();

    let ping = Envelope::ping(42, 1_000);
    transport.send(Frame::from(ping).to_json().unwrap()).await.unwrap();
    assert_eq!(server.sent_envelopes().len(), 1);

    let reply = transport.recv().await.unwrap().unwrap();
    let pong = Frame::from_json(&reply).unwrap().into_envelopes().remove(0);
    assert_eq!(pong.event_type, "pong");
    assert_eq!(Heartbeat::from_envelope(&pong).unwrap().id, 42);
}

#[tokio::test]
async fn test_mock_transport_acks_pushes() {
    let server = MockServer::new();
    server.set_ack_mode(AckMode::RejectAll("stale version".into()));
    let mut transport = server.transport();
    transport.connect("ws://localhost:1234").await.unwrap();

    let item = fl_core::OfflineItem::new("report", serde_json::json!({"n": 1}), 5);
    let envelope = SyncPush::from(&item).into_envelope(5).unwrap();
    transport.send(envelope.to_json().unwrap()).await.unwrap();

    let reply = transport.recv().await.unwrap().unwrap();
    let ack = SyncAck::from_envelope(&Envelope::from_json(&reply).unwrap()).unwrap();
    assert_eq!(ack.id, item.id);
    assert!(!ack.accepted);
    assert_eq!(server.sent_pushes().len(), 1);
}

#[tokio::test]
async fn test_mock_transport_connect_fail() {
    let server = MockServer::new();
    server.fail_next_connects(1);
    let mut transport = server.transport();

    assert!(transport.connect("ws://localhost:1234").await.is_err());
    assert!(!transport.is_connected());

    transport.connect("ws://localhost:1234").await.unwrap();
    assert!(transport.is_connected());
    assert_eq!(server.connect_count(), 2);
}

#[tokio::test]
async fn test_mock_server_drop_ends_stream() {
    let server = MockServer::new();
    let mut transport = server.transport();
    transport.connect("ws://localhost:1234").await.unwrap();

    server.drop_connection();
    assert!(transport.recv().await.unwrap().is_none());
    assert!(!transport.is_connected());
    assert!(matches!(transport.send("{}".into()).await, Err(TransportError::ConnectionClosed)));
}
