// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime client configuration.
//!
//! Every field is optional in the TOML file and falls back to a default:
//!
//! ```toml
//! url = "ws://line-server:7890"
//! maxReconnectAttempts = 15
//! heartbeatInterval = 30000   # milliseconds, 0 disables heartbeats
//! batchSize = 10
//! batchTimeout = 100          # milliseconds
//! syncInterval = 30000        # milliseconds
//! maxRetries = 3
//! conflictResolution = "server"
//! storePath = "/var/lib/floorlink/offline.db"
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How conflicted offline items are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    /// Server value wins: conflicted local items are deleted.
    #[default]
    Server,
    /// Client value wins: conflicted items are cleared and resent.
    Client,
    /// Conflicts are left for external resolution.
    Manual,
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConflictResolution::Server => "server",
            ConflictResolution::Client => "client",
            ConflictResolution::Manual => "manual",
        };
        f.write_str(name)
    }
}

impl FromStr for ConflictResolution {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(ConflictResolution::Server),
            "client" => Ok(ConflictResolution::Client),
            "manual" => Ok(ConflictResolution::Manual),
            other => Err(ConfigError::Invalid(format!(
                "unknown conflict resolution '{other}': expected server, client or manual"
            ))),
        }
    }
}

/// Configuration for the connection manager, batcher and sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeConfig {
    /// WebSocket URL of the line server.
    #[serde(default = "default_url")]
    pub url: String,
    /// Reconnection attempts before moving to OFFLINE.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Backoff delay of the first reconnection attempt.
    #[serde(default = "default_reconnect_base_delay_ms", rename = "reconnectBaseDelay")]
    pub reconnect_base_delay_ms: u64,
    /// Upper bound of the backoff delay.
    #[serde(default = "default_max_reconnect_delay_ms", rename = "maxReconnectDelay")]
    pub max_reconnect_delay_ms: u64,
    /// Max time to wait for the transport to open.
    #[serde(default = "default_connect_timeout_ms", rename = "connectTimeout")]
    pub connect_timeout_ms: u64,
    /// Heartbeat ping interval. 0 = disabled.
    #[serde(default = "default_heartbeat_interval_ms", rename = "heartbeatInterval")]
    pub heartbeat_interval_ms: u64,
    /// Consecutive unanswered pings before the connection is declared dead.
    #[serde(default = "default_max_missed_heartbeats")]
    pub max_missed_heartbeats: u32,
    /// Queued envelopes that trigger an immediate flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Max time an envelope waits in the batch.
    #[serde(default = "default_batch_timeout_ms", rename = "batchTimeout")]
    pub batch_timeout_ms: u64,
    /// Max envelopes per transport frame.
    #[serde(default = "default_max_frame_envelopes")]
    pub max_frame_envelopes: usize,
    /// Period of the background sync pass.
    #[serde(default = "default_sync_interval_ms", rename = "syncInterval")]
    pub sync_interval_ms: u64,
    /// Failed pushes before an item becomes a conflict.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Max time to wait for a `sync_ack`.
    #[serde(default = "default_push_timeout_ms", rename = "pushTimeout")]
    pub push_timeout_ms: u64,
    /// Strategy applied by `resolve_conflicts(None)`.
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
    /// Pause between disconnect and connect in `force_reconnect()`.
    #[serde(default = "default_force_reconnect_cooldown_ms", rename = "forceReconnectCooldown")]
    pub force_reconnect_cooldown_ms: u64,
    /// SQLite file for the offline store. Absent = in-memory store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
}

fn default_url() -> String {
    "ws://localhost:7890".to_string()
}

fn default_max_reconnect_attempts() -> u32 {
    15
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_max_missed_heartbeats() -> u32 {
    3
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_timeout_ms() -> u64 {
    100
}

fn default_max_frame_envelopes() -> usize {
    50
}

fn default_sync_interval_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_push_timeout_ms() -> u64 {
    10_000
}

fn default_force_reconnect_cooldown_ms() -> u64 {
    1_000
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        RealtimeConfig {
            url: default_url(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            max_missed_heartbeats: default_max_missed_heartbeats(),
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            max_frame_envelopes: default_max_frame_envelopes(),
            sync_interval_ms: default_sync_interval_ms(),
            max_retries: default_max_retries(),
            push_timeout_ms: default_push_timeout_ms(),
            conflict_resolution: ConflictResolution::default(),
            force_reconnect_cooldown_ms: default_force_reconnect_cooldown_ms(),
            store_path: None,
        }
    }
}

impl RealtimeConfig {
    /// Creates a default config pointing at the given URL.
    pub fn with_url(url: impl Into<String>) -> Self {
        RealtimeConfig { url: url.into(), ..Default::default() }
    }

    /// Loads and validates configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: RealtimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "url '{}' must start with ws:// or wss://",
                self.url
            )));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batchSize must be greater than 0".to_string()));
        }
        if self.max_frame_envelopes == 0 {
            return Err(ConfigError::Invalid(
                "maxFrameEnvelopes must be greater than 0".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("maxRetries must be greater than 0".to_string()));
        }
        if self.max_missed_heartbeats == 0 {
            return Err(ConfigError::Invalid(
                "maxMissedHeartbeats must be greater than 0".to_string(),
            ));
        }
        for (name, value) in [
            ("batchTimeout", self.batch_timeout_ms),
            ("syncInterval", self.sync_interval_ms),
            ("pushTimeout", self.push_timeout_ms),
            ("connectTimeout", self.connect_timeout_ms),
            ("reconnectBaseDelay", self.reconnect_base_delay_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }
        if self.max_reconnect_delay_ms < self.reconnect_base_delay_ms {
            return Err(ConfigError::Invalid(
                "maxReconnectDelay must not be less than reconnectBaseDelay".to_string(),
            ));
        }
        Ok(())
    }

    /// Wait before reconnection attempt `attempt` (starting at 1):
    /// `min(base * 2^(attempt-1), max)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let delay = self.reconnect_base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_reconnect_delay_ms))
    }

    /// Heartbeat interval, or `None` when heartbeats are disabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    pub fn force_reconnect_cooldown(&self) -> Duration {
        Duration::from_millis(self.force_reconnect_cooldown_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
