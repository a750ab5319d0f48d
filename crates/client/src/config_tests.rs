// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use tempfile::TempDir;
use yare::parameterized;

#[test]
fn defaults_match_documented_values() {
    let config = RealtimeConfig::default();
    assert_eq!(config.max_reconnect_attempts, 15);
    assert_eq!(config.heartbeat_interval_ms, 30_000);
    assert_eq!(config.batch_size, 10);
    assert_eq!(config.batch_timeout_ms, 100);
    assert_eq!(config.sync_interval_ms, 30_000);
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.max_missed_heartbeats, 3);
    assert_eq!(config.conflict_resolution, ConflictResolution::Server);
    assert!(config.validate().is_ok());
}

#[test]
fn empty_toml_gives_defaults() {
    let config = RealtimeConfig::from_toml("").unwrap();
    assert_eq!(config, RealtimeConfig::default());
}

#[test]
fn toml_uses_camel_case_names() {
    let config = RealtimeConfig::from_toml(
        r#"
url = "wss://line-7.plant.local/realtime"
maxReconnectAttempts = 4
heartbeatInterval = 0
batchSize = 25
batchTimeout = 250
syncInterval = 60000
maxRetries = 5
conflictResolution = "manual"
storePath = "/tmp/offline.db"
"#,
    )
    .unwrap();

    assert_eq!(config.url, "wss://line-7.plant.local/realtime");
    assert_eq!(config.max_reconnect_attempts, 4);
    assert_eq!(config.heartbeat_interval(), None);
    assert_eq!(config.batch_size, 25);
    assert_eq!(config.batch_timeout(), Duration::from_millis(250));
    assert_eq!(config.sync_interval(), Duration::from_secs(60));
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.conflict_resolution, ConflictResolution::Manual);
    assert_eq!(config.store_path, Some(PathBuf::from("/tmp/offline.db")));
}

#[test]
fn load_reads_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("floorlink.toml");
    fs::write(&path, "batchSize = 3\n").unwrap();

    let config = RealtimeConfig::load(&path).unwrap();
    assert_eq!(config.batch_size, 3);
}

#[test]
fn load_missing_file_is_read_error() {
    let dir = TempDir::new().unwrap();
    let err = RealtimeConfig::load(&dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[parameterized(
    bad_scheme = { "url = \"http://example.com\"" },
    zero_batch = { "batchSize = 0" },
    zero_retries = { "maxRetries = 0" },
    zero_sync_interval = { "syncInterval = 0" },
    zero_missed = { "maxMissedHeartbeats = 0" },
    inverted_backoff = { "reconnectBaseDelay = 5000\nmaxReconnectDelay = 1000" },
)]
fn invalid_values_rejected(toml: &str) {
    let err = RealtimeConfig::from_toml(toml).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "got {err:?}");
}

#[test]
fn unknown_resolution_is_parse_error() {
    let err = RealtimeConfig::from_toml("conflictResolution = \"coinflip\"").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[parameterized(
    first = { 1, 1_000 },
    second = { 2, 2_000 },
    third = { 3, 4_000 },
    fifth = { 5, 16_000 },
    capped = { 6, 30_000 },
    far = { 40, 30_000 },
    huge = { u32::MAX, 30_000 },
)]
fn backoff_delay_doubles_until_cap(attempt: u32, expected_ms: u64) {
    let config = RealtimeConfig::default();
    assert_eq!(config.backoff_delay(attempt), Duration::from_millis(expected_ms));
}

#[parameterized(
    server = { "server", ConflictResolution::Server },
    client = { "client", ConflictResolution::Client },
    manual = { "manual", ConflictResolution::Manual },
)]
fn conflict_resolution_from_str(input: &str, expected: ConflictResolution) {
    assert_eq!(input.parse::<ConflictResolution>().unwrap(), expected);
    assert_eq!(expected.to_string(), input);
}
