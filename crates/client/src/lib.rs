// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! floorlink: real-time synchronization core for factory-floor dashboards.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  send/publish  ┌──────────────┐   frames   ┌─────────────┐
//! │ application  │───────────────►│  Connection  │───────────►│  Transport  │
//! │   (screens)  │◄───────────────│   Manager    │◄───────────│   (trait)   │
//! └──────────────┘   callbacks    └──────────────┘            └─────────────┘
//!        │                          │    │    │
//!        │ write            batcher─┘    │    └─router
//!        ▼                               │ health
//! ┌──────────────┐   push/ack     ┌──────┴───────┐
//! │ OfflineStore │◄──────────────►│  SyncEngine  │
//! │  (SQLite)    │                └──────────────┘
//! └──────────────┘
//! ```
//!
//! # Features
//!
//! - One WebSocket connection multiplexing many event streams
//! - Exponential backoff reconnection and heartbeat-driven health scoring
//! - Filtered subscriptions with panic isolation per subscriber
//! - Priority batching of outbound envelopes (CRITICAL bypasses the batch)
//! - Durable offline store with retry/conflict-resolving sync
//! - Injectable transport and clock for testing

pub mod batcher;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod health;
pub mod router;
pub mod store;
pub mod sync;
pub mod transport;

pub use batcher::{Admission, PriorityBatcher};
pub use client::RealtimeClient;
pub use config::{ConfigError, ConflictResolution, RealtimeConfig};
pub use connection::{ConnectionManager, ConnectionState, LifecycleEvent, SendOutcome};
pub use error::{Error, ErrorKind, Result};
pub use health::{ConnectionMetrics, HealthMonitor};
pub use router::{Filter, SubscriptionId, SubscriptionRouter};
pub use store::{ItemBackend, MemoryBackend, OfflineStore, SqliteBackend, StoreError, StoreStats};
pub use sync::{ItemPusher, PushError, SyncEngine, SyncReport, SyncStatus};
pub use transport::{Transport, TransportError, WebSocketTransport};

pub use fl_core::{ClockSource, Envelope, Frame, OfflineItem, Priority, SystemClock};

#[cfg(test)]
mod test_helpers;

#[cfg(test)]
mod transport_tests;
