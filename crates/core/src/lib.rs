// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! fl-core: Shared wire model for floorlink
//!
//! This crate provides the envelope format, priorities, heartbeat and sync
//! protocol payloads, and offline item records used by both the floorlink
//! client and the fl-relay server.

pub mod clock;
pub mod envelope;
pub mod error;
pub mod offline;
pub mod protocol;

pub use clock::{ClockSource, SystemClock};
pub use envelope::{Envelope, Frame, Priority};
pub use error::{Error, Result};
pub use offline::OfflineItem;
pub use protocol::{Heartbeat, SyncAck, SyncPush};
