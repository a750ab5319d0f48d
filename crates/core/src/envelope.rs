// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Envelopes and frames exchanged over the realtime connection.
//!
//! Every message on the wire is an [`Envelope`]:
//!
//! ```json
//! {"type": "line_status", "data": {"lineId": "L1"}, "timestamp": 1700000000000, "priority": "HIGH"}
//! ```
//!
//! A [`Frame`] is what actually travels in one transport message: either a
//! single envelope object or a JSON array of envelopes produced by a batch
//! flush.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::protocol::{Heartbeat, PING, PONG};

/// Delivery urgency of an outbound envelope.
///
/// Ordered `Critical > High > Normal > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// All priorities, most urgent first. This is the flush order.
    pub const ALL: [Priority; 4] = [Priority::Critical, Priority::High, Priority::Normal, Priority::Low];

    /// Position in [`Priority::ALL`], usable as a queue index.
    pub fn index(self) -> usize {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }

    /// Wire name of the priority.
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "CRITICAL",
            Priority::High => "HIGH",
            Priority::Normal => "NORMAL",
            Priority::Low => "LOW",
        }
    }

    fn rank(self) -> u8 {
        3 - self.index() as u8
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Priority::Critical),
            "HIGH" => Ok(Priority::High),
            "NORMAL" => Ok(Priority::Normal),
            "LOW" => Ok(Priority::Low),
            _ => Err(Error::InvalidPriority(s.to_string())),
        }
    }
}

/// The unit of message exchanged over the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Logical event stream this envelope belongs to.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Arbitrary JSON payload.
    #[serde(default)]
    pub data: Value,
    /// Milliseconds since Unix epoch when the envelope was created.
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub priority: Priority,
}

impl Envelope {
    /// Creates an envelope with `Normal` priority.
    pub fn new(event_type: impl Into<String>, data: Value, timestamp: u64) -> Self {
        Envelope { event_type: event_type.into(), data, timestamp, priority: Priority::Normal }
    }

    /// Returns the envelope with the given priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Creates a heartbeat ping.
    pub fn ping(id: u64, timestamp: u64) -> Self {
        Envelope::new(PING, Heartbeat { id }.to_value(), timestamp).with_priority(Priority::Critical)
    }

    /// Creates a heartbeat pong answering the ping with the same `id`.
    pub fn pong(id: u64, timestamp: u64) -> Self {
        Envelope::new(PONG, Heartbeat { id }.to_value(), timestamp).with_priority(Priority::Critical)
    }

    /// Returns true for `ping`/`pong` envelopes.
    pub fn is_heartbeat(&self) -> bool {
        self.event_type == PING || self.event_type == PONG
    }

    /// Transient envelopes are dropped rather than persisted when the
    /// connection is unavailable.
    pub fn is_transient(&self) -> bool {
        self.is_heartbeat()
    }

    /// Serializes the envelope to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes an envelope from JSON.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// One transport message: a single envelope or a flushed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Batch(Vec<Envelope>),
    Single(Envelope),
}

impl Frame {
    /// Builds a frame from an ordered list, collapsing a one-element list to
    /// a single envelope.
    pub fn from_envelopes(mut envelopes: Vec<Envelope>) -> Result<Self> {
        match envelopes.len() {
            0 => Err(Error::MalformedFrame("empty batch".to_string())),
            1 => Ok(envelopes.remove(0).into()),
            _ => Ok(Frame::Batch(envelopes)),
        }
    }

    /// Number of envelopes carried by the frame.
    pub fn len(&self) -> usize {
        match self {
            Frame::Batch(envelopes) => envelopes.len(),
            Frame::Single(_) => 1,
        }
    }

    /// Returns true if the frame carries no envelopes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unpacks the frame, preserving batch order.
    pub fn into_envelopes(self) -> Vec<Envelope> {
        match self {
            Frame::Batch(envelopes) => envelopes,
            Frame::Single(envelope) => vec![envelope],
        }
    }

    /// Serializes the frame to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes a frame from JSON.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl From<Envelope> for Frame {
    fn from(envelope: Envelope) -> Self {
        Frame::Single(envelope)
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
