// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Reserved envelope types and their payloads.
//!
//! The protocol is simple:
//! - Either side sends `ping` with an id; the other answers `pong` with the same id
//! - Client pushes offline items as `sync_push`; server answers `sync_ack`
//! - Every other envelope type is application traffic

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::{Envelope, Priority};
use crate::error::{Error, Result};
use crate::offline::OfflineItem;

/// Heartbeat request.
pub const PING: &str = "ping";
/// Heartbeat response.
pub const PONG: &str = "pong";
/// Client → server offline item push.
pub const SYNC_PUSH: &str = "sync_push";
/// Server → client push acknowledgement.
pub const SYNC_ACK: &str = "sync_ack";

/// Returns true if the event type is reserved by the protocol.
pub fn is_reserved(event_type: &str) -> bool {
    matches!(event_type, PING | PONG | SYNC_PUSH | SYNC_ACK)
}

/// Payload of `ping` and `pong` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Sender-chosen ID echoed in the pong.
    pub id: u64,
}

impl Heartbeat {
    pub(crate) fn to_value(self) -> Value {
        serde_json::json!({ "id": self.id })
    }

    /// Extracts the heartbeat payload from a `ping` or `pong` envelope.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        if !envelope.is_heartbeat() {
            return Err(Error::UnexpectedType {
                expected: format!("{PING}|{PONG}"),
                found: envelope.event_type.clone(),
            });
        }
        Ok(serde_json::from_value(envelope.data.clone())?)
    }
}

/// Payload of a `sync_push` envelope: one offline item offered to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPush {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub payload: Value,
    pub version: u32,
    pub created_at: u64,
}

impl SyncPush {
    /// Wraps the push in a CRITICAL envelope.
    pub fn into_envelope(self, timestamp: u64) -> Result<Envelope> {
        let data = serde_json::to_value(self)?;
        Ok(Envelope::new(SYNC_PUSH, data, timestamp).with_priority(Priority::Critical))
    }

    /// Extracts the push from a `sync_push` envelope.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        decode(envelope, SYNC_PUSH)
    }
}

impl From<&OfflineItem> for SyncPush {
    fn from(item: &OfflineItem) -> Self {
        SyncPush {
            id: item.id.clone(),
            item_type: item.item_type.clone(),
            payload: item.payload.clone(),
            version: item.version,
            created_at: item.created_at,
        }
    }
}

/// Payload of a `sync_ack` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAck {
    /// ID of the pushed item.
    pub id: String,
    /// Whether the server applied (or already had) the item.
    pub accepted: bool,
    /// Why the server refused the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SyncAck {
    /// Creates an accepting ack.
    pub fn accepted(id: impl Into<String>) -> Self {
        SyncAck { id: id.into(), accepted: true, reason: None }
    }

    /// Creates a rejecting ack.
    pub fn rejected(id: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncAck { id: id.into(), accepted: false, reason: Some(reason.into()) }
    }

    /// Wraps the ack in a CRITICAL envelope.
    pub fn into_envelope(self, timestamp: u64) -> Result<Envelope> {
        let data = serde_json::to_value(self)?;
        Ok(Envelope::new(SYNC_ACK, data, timestamp).with_priority(Priority::Critical))
    }

    /// Extracts the ack from a `sync_ack` envelope.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        decode(envelope, SYNC_ACK)
    }
}

fn decode<T: DeserializeOwned>(envelope: &Envelope, expected: &str) -> Result<T> {
    if envelope.event_type != expected {
        return Err(Error::UnexpectedType {
            expected: expected.to_string(),
            found: envelope.event_type.clone(),
        });
    }
    Ok(serde_json::from_value(envelope.data.clone())?)
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
