// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket server implementation.
//!
//! Handles client connections, heartbeat replies, item pushes and fan-out
//! of application traffic.

use std::net::SocketAddr;

use fl_core::protocol::{PING, PONG, SYNC_ACK, SYNC_PUSH};
use fl_core::{Envelope, Frame, Heartbeat, SyncAck, SyncPush};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::log::PushOutcome;
use crate::state::ServerState;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Reason sent back when a push carries an outdated version.
pub const STALE_VERSION: &str = "stale version";

/// Run the WebSocket server on the given address.
pub async fn run(addr: SocketAddr, state: ServerState) -> Result<(), BoxError> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on: {}", addr);
    serve(listener, state).await
}

/// Accepts connections on an already bound listener.
pub(crate) async fn serve(listener: TcpListener, state: ServerState) -> Result<(), BoxError> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let state = state.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }
}

/// Handle a single WebSocket connection.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: ServerState,
) -> Result<(), BoxError> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let connection = state.register();
    info!(connection, "New WebSocket connection from: {}", peer_addr);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();
    let mut fanout = state.subscribe();

    loop {
        tokio::select! {
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        for reply in handle_frame(text.as_str(), &state, connection).await? {
                            ws_sink.send(Message::Text(reply.into())).await?;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} disconnected", peer_addr);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        ws_sink.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(_)) => {
                        // Binary, Pong and raw frames carry no protocol traffic
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", peer_addr, e);
                        break;
                    }
                    None => {
                        info!("Client {} stream ended", peer_addr);
                        break;
                    }
                }
            }

            relayed = fanout.recv() => {
                match relayed {
                    Ok(relayed) if relayed.origin == connection => {}
                    Ok(relayed) => {
                        if let Err(e) = ws_sink.send(Message::Text(relayed.frame.into())).await {
                            warn!("Failed to relay to {}: {}", peer_addr, e);
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("Client {} lagged by {} frames", peer_addr, n);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    info!("Connection closed: {}", peer_addr);
    Ok(())
}

/// Processes one inbound frame and returns the frames to send back.
///
/// Malformed frames are logged and dropped; only storage failures end the
/// connection.
pub(crate) async fn handle_frame(
    text: &str,
    state: &ServerState,
    connection: u64,
) -> Result<Vec<String>, BoxError> {
    let frame = match Frame::from_json(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(connection, error = %e, "dropping malformed frame");
            return Ok(Vec::new());
        }
    };

    let mut replies = Vec::new();
    let mut relay = Vec::new();
    for envelope in frame.into_envelopes() {
        match envelope.event_type.as_str() {
            PING => match Heartbeat::from_envelope(&envelope) {
                Ok(ping) => replies.push(Envelope::pong(ping.id, state.now_ms()).to_json()?),
                Err(e) => warn!(connection, error = %e, "bad ping"),
            },
            PONG | SYNC_ACK => debug!(connection, event_type = %envelope.event_type, "ignoring"),
            SYNC_PUSH => match SyncPush::from_envelope(&envelope) {
                Ok(push) => {
                    let ack = apply_push(&push, state, connection).await?;
                    replies.push(ack.into_envelope(state.now_ms())?.to_json()?);
                }
                Err(e) => warn!(connection, error = %e, "bad sync_push"),
            },
            _ => relay.push(envelope),
        }
    }

    if !relay.is_empty() {
        debug!(connection, count = relay.len(), "relaying envelopes");
        state.relay(relay, connection);
    }
    Ok(replies)
}

async fn apply_push(push: &SyncPush, state: &ServerState, connection: u64) -> Result<SyncAck, BoxError> {
    let ack = match state.apply_push(push, connection).await? {
        PushOutcome::Applied => {
            info!(connection, id = %push.id, version = push.version, "item applied");
            SyncAck::accepted(&push.id)
        }
        PushOutcome::Duplicate => {
            debug!(connection, id = %push.id, "duplicate push acknowledged");
            SyncAck::accepted(&push.id)
        }
        PushOutcome::Stale { stored } => {
            warn!(connection, id = %push.id, version = push.version, stored, "rejecting stale push");
            SyncAck::rejected(&push.id, STALE_VERSION)
        }
    };
    Ok(ack)
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
