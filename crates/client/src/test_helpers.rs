// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for client module tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fl_core::{ClockSource, Envelope, Priority};
use serde_json::Value;

use crate::config::RealtimeConfig;

/// Wall clock pinned by the test.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Arc<Self> {
        Arc::new(ManualClock { now: AtomicU64::new(now_ms) })
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl ClockSource for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Config with short timers and heartbeats disabled.
pub fn test_config() -> RealtimeConfig {
    RealtimeConfig {
        url: "ws://mock:7890".to_string(),
        max_reconnect_attempts: 3,
        reconnect_base_delay_ms: 100,
        max_reconnect_delay_ms: 1_000,
        connect_timeout_ms: 500,
        heartbeat_interval_ms: 0,
        batch_timeout_ms: 50,
        sync_interval_ms: 60_000,
        push_timeout_ms: 200,
        force_reconnect_cooldown_ms: 100,
        ..RealtimeConfig::default()
    }
}

pub fn envelope(event_type: &str, data: Value, priority: Priority) -> Envelope {
    Envelope::new(event_type, data, 1_000).with_priority(priority)
}

/// Polls `check` until it holds, failing the test after a minute of
/// (usually paused) tokio time.
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..6_000 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
