// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection state machine.
//!
//! ```text
//! DISCONNECTED ──connect──► CONNECTING ──open──► CONNECTED
//!                               │                   │ closed / error / missed pongs
//!                               │ open failed       ▼
//!                               └──────────────► RECONNECTING ──open──► CONNECTED
//!                                                   │ attempts exhausted
//!                                                   ▼
//!                       CONNECTING ◄──online/force── OFFLINE
//! ```
//!
//! `disconnect()` reaches DISCONNECTED from every other state.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use serde::Serialize;

/// Lifecycle state of the single logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
    Offline = 4,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Reconnecting => "RECONNECTING",
            ConnectionState::Offline => "OFFLINE",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            4 => ConnectionState::Offline,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Returns true if `target` is a legal next state.
    pub fn can_transition_to(self, target: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, target),
            (Disconnected, Connecting)
                | (Connecting, Connected | Reconnecting | Offline | Disconnected)
                | (Connected, Reconnecting | Offline | Disconnected)
                | (Reconnecting, Connected | Offline | Disconnected)
                | (Offline, Connecting | Disconnected)
        )
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state visible to both the driver task and callers.
///
/// Uses atomic fields for lock-free reads.
#[derive(Debug)]
pub struct SharedConnectionState {
    state: AtomicU8,
    /// Reconnection attempt in progress (0 when not reconnecting).
    attempt: AtomicU32,
}

impl SharedConnectionState {
    /// Create a new shared state initialized to disconnected.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            attempt: AtomicU32::new(0),
        }
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::Acquire)
    }

    pub fn set_attempt(&self, attempt: u32) {
        self.attempt.store(attempt, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.get().is_connected()
    }

    /// Human-readable status, e.g. `RECONNECTING (attempt 3)`.
    pub fn status_string(&self) -> String {
        match self.get() {
            ConnectionState::Reconnecting if self.attempt() > 0 => {
                format!("RECONNECTING (attempt {})", self.attempt())
            }
            state => state.to_string(),
        }
    }
}

impl Default for SharedConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
