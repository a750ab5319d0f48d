// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection health scoring.
//!
//! The score is a weighted sum recomputed on every update:
//!
//! | component         | weight | full penalty at                  |
//! |-------------------|--------|----------------------------------|
//! | latency           | 0.4    | 2000 ms (no penalty up to 200)   |
//! | error rate        | 0.3    | every recent outcome an error    |
//! | missed heartbeats | 0.3    | `max_missed` consecutive misses  |
//!
//! A monitor marked down, or one that reached the missed heartbeat limit,
//! scores 0.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;
use tokio::time::Instant;

const LATENCY_WEIGHT: f64 = 0.4;
const ERROR_WEIGHT: f64 = 0.3;
const HEARTBEAT_WEIGHT: f64 = 0.3;

const LATENCY_GOOD_MS: f64 = 200.0;
const LATENCY_BAD_MS: f64 = 2_000.0;

/// Number of recent send/receive outcomes the error rate is computed over.
pub const ERROR_WINDOW: usize = 50;

/// Read-only snapshot of connection health.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMetrics {
    /// Latest heartbeat round trip, if any.
    pub latency_ms: Option<u64>,
    pub message_count: u64,
    pub error_count: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Time since the current connection opened. 0 while down.
    pub uptime_ms: u64,
    pub health_score: f64,
    pub missed_heartbeats: u32,
    pub reconnect_attempt: u32,
}

#[derive(Debug)]
struct HealthInner {
    latency_ms: Option<u64>,
    message_count: u64,
    error_count: u64,
    bytes_sent: u64,
    bytes_received: u64,
    connected_since: Option<Instant>,
    missed_heartbeats: u32,
    reconnect_attempt: u32,
    /// true = error
    outcomes: VecDeque<bool>,
    score: f64,
}

impl HealthInner {
    fn new() -> Self {
        HealthInner {
            latency_ms: None,
            message_count: 0,
            error_count: 0,
            bytes_sent: 0,
            bytes_received: 0,
            connected_since: None,
            missed_heartbeats: 0,
            reconnect_attempt: 0,
            outcomes: VecDeque::with_capacity(ERROR_WINDOW),
            score: 1.0,
        }
    }

    fn push_outcome(&mut self, error: bool) {
        if self.outcomes.len() == ERROR_WINDOW {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(error);
    }

    fn error_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let errors = self.outcomes.iter().filter(|e| **e).count();
        errors as f64 / self.outcomes.len() as f64
    }
}

/// Rolling connection metrics and the derived health score.
#[derive(Debug)]
pub struct HealthMonitor {
    inner: Mutex<HealthInner>,
    max_missed: u32,
}

impl HealthMonitor {
    pub fn new(max_missed_heartbeats: u32) -> Self {
        HealthMonitor { inner: Mutex::new(HealthInner::new()), max_missed: max_missed_heartbeats.max(1) }
    }

    fn update(&self, f: impl FnOnce(&mut HealthInner)) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut inner);
        inner.score = compute_score(
            inner.latency_ms,
            inner.error_rate(),
            inner.missed_heartbeats,
            self.max_missed,
            inner.connected_since.is_some(),
        );
    }

    /// Records a frame carrying `envelopes` envelopes.
    pub fn record_sent(&self, bytes: usize, envelopes: usize) {
        self.update(|h| {
            h.bytes_sent = h.bytes_sent.saturating_add(bytes as u64);
            h.message_count = h.message_count.saturating_add(envelopes as u64);
            h.push_outcome(false);
        });
    }

    pub fn record_received(&self, bytes: usize) {
        self.update(|h| {
            h.bytes_received = h.bytes_received.saturating_add(bytes as u64);
            h.message_count = h.message_count.saturating_add(1);
            h.push_outcome(false);
        });
    }

    pub fn record_error(&self) {
        self.update(|h| {
            h.error_count = h.error_count.saturating_add(1);
            h.push_outcome(true);
        });
    }

    pub fn record_latency(&self, latency_ms: u64) {
        self.update(|h| h.latency_ms = Some(latency_ms));
    }

    /// Counts an unanswered heartbeat. Returns true once the limit is reached.
    pub fn record_missed_heartbeat(&self) -> bool {
        let mut reached = false;
        self.update(|h| {
            h.missed_heartbeats = h.missed_heartbeats.saturating_add(1);
            reached = h.missed_heartbeats >= self.max_missed;
        });
        reached
    }

    /// A pong arrived: the missed heartbeat streak ends.
    pub fn heartbeat_ok(&self) {
        self.update(|h| h.missed_heartbeats = 0);
    }

    pub fn mark_connected(&self) {
        self.update(|h| {
            h.connected_since = Some(Instant::now());
            h.missed_heartbeats = 0;
            h.reconnect_attempt = 0;
        });
    }

    pub fn mark_disconnected(&self) {
        self.update(|h| {
            h.connected_since = None;
            h.missed_heartbeats = 0;
        });
    }

    pub fn set_reconnect_attempt(&self, attempt: u32) {
        self.update(|h| h.reconnect_attempt = attempt);
    }

    /// Clears every counter and restores the score to 1.0.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *inner = HealthInner::new();
    }

    pub fn score(&self) -> f64 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).score
    }

    pub fn snapshot(&self) -> ConnectionMetrics {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        ConnectionMetrics {
            latency_ms: inner.latency_ms,
            message_count: inner.message_count,
            error_count: inner.error_count,
            bytes_sent: inner.bytes_sent,
            bytes_received: inner.bytes_received,
            uptime_ms: inner
                .connected_since
                .map(|since| since.elapsed().as_millis() as u64)
                .unwrap_or(0),
            health_score: inner.score,
            missed_heartbeats: inner.missed_heartbeats,
            reconnect_attempt: inner.reconnect_attempt,
        }
    }
}

/// Weighted health score in `[0, 1]`.
pub fn compute_score(
    latency_ms: Option<u64>,
    error_rate: f64,
    missed_heartbeats: u32,
    max_missed: u32,
    connected: bool,
) -> f64 {
    if !connected || missed_heartbeats >= max_missed {
        return 0.0;
    }
    let latency_score = match latency_ms {
        None => 1.0,
        Some(ms) => {
            let ms = ms as f64;
            1.0 - ((ms - LATENCY_GOOD_MS) / (LATENCY_BAD_MS - LATENCY_GOOD_MS)).clamp(0.0, 1.0)
        }
    };
    let error_score = 1.0 - error_rate.clamp(0.0, 1.0);
    let heartbeat_score = 1.0 - f64::from(missed_heartbeats) / f64::from(max_missed.max(1));
    let score = LATENCY_WEIGHT * latency_score
        + ERROR_WEIGHT * error_score
        + HEARTBEAT_WEIGHT * heartbeat_score;
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
