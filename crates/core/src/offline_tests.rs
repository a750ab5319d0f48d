// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use std::collections::HashSet;

fn item() -> OfflineItem {
    OfflineItem::new("quality_check", json!({"station": 4, "pass": true}), 1_700_000_000_000)
}

#[test]
fn new_item_is_pending() {
    let item = item();
    assert!(item.is_pending());
    assert_eq!(item.retry_count, 0);
    assert_eq!(item.version, 1);
    assert!(!item.synced);
    assert!(!item.conflict);
}

#[test]
fn id_has_type_timestamp_random_shape() {
    let item = item();
    let parts: Vec<&str> = item.id.rsplitn(3, '_').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0].len(), 8);
    assert!(parts[0].chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(parts[1], "1700000000000");
    assert_eq!(parts[2], "quality_check");
}

#[test]
fn ids_are_unique_for_identical_saves() {
    let ids: HashSet<String> = (0..100).map(|_| item().id).collect();
    assert_eq!(ids.len(), 100);
}

#[test]
fn failures_become_conflict_at_budget() {
    let mut item = item();
    assert!(!item.record_failure(3, "timeout"));
    assert!(!item.record_failure(3, "timeout"));
    assert!(item.record_failure(3, "rejected"));

    assert!(item.conflict);
    assert!(!item.synced);
    assert_eq!(item.retry_count, 3);
    assert_eq!(item.last_error.as_deref(), Some("rejected"));
}

#[test]
fn failures_stop_counting_once_conflicted() {
    let mut item = item();
    item.record_failure(1, "x");
    assert!(item.conflict);

    assert!(!item.record_failure(1, "y"));
    assert_eq!(item.retry_count, 1);
}

#[test]
fn synced_is_never_conflict() {
    let mut item = item();
    item.record_failure(5, "x");
    item.mark_synced();
    assert!(item.synced);
    assert!(!item.conflict);
    assert!(item.last_error.is_none());

    assert!(!item.record_failure(1, "late"));
    assert!(!item.conflict);
}

#[test]
fn reset_and_clear_conflict() {
    let mut item = item();
    item.record_failure(1, "x");

    let mut reset = item.clone();
    reset.reset_retries();
    assert!(reset.is_pending());
    assert_eq!(reset.retry_count, 0);

    item.clear_conflict();
    assert!(item.is_pending());
    assert_eq!(item.retry_count, 1);
}

#[test]
fn serializes_camel_case() {
    let value = serde_json::to_value(item()).unwrap();
    assert!(value.get("createdAt").is_some());
    assert!(value.get("retryCount").is_some());
    assert_eq!(value["type"], json!("quality_check"));
    assert!(value.get("lastError").is_none());
}
