// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

fn env(event_type: &str, priority: Priority) -> Envelope {
    Envelope::new(event_type, json!({}), 1_000).with_priority(priority)
}

fn types(envelopes: &[Envelope]) -> Vec<&str> {
    envelopes.iter().map(|e| e.event_type.as_str()).collect()
}

#[test]
fn critical_bypasses_when_connected() {
    let mut batcher = PriorityBatcher::new(10);
    batcher.admit(env("a", Priority::Normal), true);

    let admission = batcher.admit(env("b", Priority::Critical), true);
    assert!(matches!(admission, Admission::Bypass(ref e) if e.event_type == "b"));
    assert_eq!(batcher.len(), 1);
}

#[test]
fn drain_orders_by_priority_then_fifo() {
    let mut batcher = PriorityBatcher::new(100);
    for (name, priority) in [
        ("low-1", Priority::Low),
        ("normal-1", Priority::Normal),
        ("high-1", Priority::High),
        ("normal-2", Priority::Normal),
        ("low-2", Priority::Low),
        ("high-2", Priority::High),
    ] {
        assert_eq!(batcher.admit(env(name, priority), true), Admission::Queued { flush: false });
    }

    let drained = batcher.drain();
    assert_eq!(types(&drained), vec!["high-1", "high-2", "normal-1", "normal-2", "low-1", "low-2"]);
    assert!(batcher.is_empty());
}

#[test]
fn size_threshold_requests_flush() {
    let mut batcher = PriorityBatcher::new(3);
    assert_eq!(batcher.admit(env("a", Priority::Low), true), Admission::Queued { flush: false });
    assert_eq!(batcher.admit(env("b", Priority::High), true), Admission::Queued { flush: false });
    assert_eq!(batcher.admit(env("c", Priority::Normal), true), Admission::Queued { flush: true });
    assert_eq!(batcher.queued(Priority::High), 1);
}

#[parameterized(
    critical = { "alarm", Priority::Critical, true },
    high = { "report", Priority::High, true },
    low = { "telemetry", Priority::Low, true },
    ping = { "ping", Priority::Critical, false },
    pong = { "pong", Priority::Critical, false },
)]
fn disconnected_admission(event_type: &str, priority: Priority, persisted: bool) {
    let mut batcher = PriorityBatcher::new(10);
    let admission = batcher.admit(env(event_type, priority), false);
    if persisted {
        assert!(matches!(admission, Admission::Offline(_)));
    } else {
        assert_eq!(admission, Admission::Dropped);
    }
    assert!(batcher.is_empty());
}

#[test]
fn drain_persistable_skips_heartbeats() {
    let mut batcher = PriorityBatcher::new(10);
    batcher.admit(env("report", Priority::Normal), true);
    batcher.admit(Envelope::pong(3, 1_000).with_priority(Priority::High), true);

    let kept = batcher.drain_persistable();
    assert_eq!(types(&kept), vec!["report"]);
    assert!(batcher.is_empty());
}

#[parameterized(
    empty = { 0, 50, vec![] },
    single = { 1, 50, vec![1] },
    under_cap = { 7, 50, vec![7] },
    exact_cap = { 4, 2, vec![2, 2] },
    remainder = { 5, 2, vec![2, 2, 1] },
)]
fn frames_respect_cap(count: usize, max: usize, expected: Vec<usize>) {
    let envelopes: Vec<_> = (0..count).map(|n| env(&format!("e{n}"), Priority::Normal)).collect();
    let frames = into_frames(envelopes, max);
    let sizes: Vec<usize> = frames.iter().map(Frame::len).collect();
    assert_eq!(sizes, expected);
}

#[test]
fn single_envelope_frame_is_not_an_array() {
    let frames = into_frames(vec![env("a", Priority::Normal)], 50);
    assert!(matches!(frames[0], Frame::Single(_)));
}
