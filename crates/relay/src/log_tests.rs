// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

fn push(id: &str, version: u32) -> SyncPush {
    SyncPush {
        id: id.to_string(),
        item_type: "downtime".to_string(),
        payload: json!({"minutes": version}),
        version,
        created_at: 1_000,
    }
}

#[test]
fn first_push_is_applied() {
    let mut log = ItemLog::in_memory();
    assert_eq!(log.apply(&push("a", 1)).unwrap(), PushOutcome::Applied);
    assert_eq!(log.len(), 1);
    assert_eq!(log.get("a").unwrap().payload, json!({"minutes": 1}));
}

#[parameterized(
    same_version_is_duplicate = { 2, PushOutcome::Duplicate },
    older_version_is_stale = { 1, PushOutcome::Stale { stored: 2 } },
    newer_version_is_applied = { 3, PushOutcome::Applied },
)]
fn version_rules(version: u32, expected: PushOutcome) {
    let mut log = ItemLog::in_memory();
    log.apply(&push("a", 2)).unwrap();
    assert_eq!(log.apply(&push("a", version)).unwrap(), expected);
}

#[test]
fn rejected_pushes_leave_stored_item_alone() {
    let mut log = ItemLog::in_memory();
    log.apply(&push("a", 2)).unwrap();
    log.apply(&push("a", 1)).unwrap();
    assert_eq!(log.get("a").unwrap().version, 2);
}

#[test]
fn replay_restores_latest_versions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("items.jsonl");

    {
        let mut log = ItemLog::open(&path).unwrap();
        log.apply(&push("a", 1)).unwrap();
        log.apply(&push("b", 1)).unwrap();
        log.apply(&push("a", 2)).unwrap();
        log.apply(&push("a", 2)).unwrap();
    }

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 3);

    let mut reopened = ItemLog::open(&path).unwrap();
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.get("a").unwrap().version, 2);
    assert_eq!(reopened.apply(&push("a", 1)).unwrap(), PushOutcome::Stale { stored: 2 });
}

#[test]
fn blank_lines_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("items.jsonl");
    let line = serde_json::to_string(&push("a", 1)).unwrap();
    std::fs::write(&path, format!("\n{line}\n\n")).unwrap();

    let log = ItemLog::open(&path).unwrap();
    assert_eq!(log.len(), 1);
}

#[test]
fn corrupt_log_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("items.jsonl");
    std::fs::write(&path, "{not json}\n").unwrap();

    assert!(ItemLog::open(&path).is_err());
}
