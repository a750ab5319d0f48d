// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only log of accepted item pushes.
//!
//! Every accepted push is appended as one JSON line and fsynced before the
//! client is acknowledged. On startup the log is replayed to rebuild the
//! canonical item table; the last line for an id wins.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use fl_core::SyncPush;

/// Result of offering a push to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// New item or newer version: appended.
    Applied,
    /// Same id and version already applied.
    Duplicate,
    /// Older than the stored version.
    Stale { stored: u32 },
}

/// Canonical item table backed by a JSONL file.
pub struct ItemLog {
    path: Option<PathBuf>,
    items: HashMap<String, SyncPush>,
}

impl ItemLog {
    /// Opens or creates the log at `path`, replaying existing records.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut items = HashMap::new();

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let push: SyncPush = serde_json::from_str(&line)?;
                items.insert(push.id.clone(), push);
            }
        }

        Ok(ItemLog { path: Some(path), items })
    }

    /// Creates a log that keeps nothing on disk.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        ItemLog { path: None, items: HashMap::new() }
    }

    /// Applies `push` under optimistic concurrency on `version`.
    pub fn apply(&mut self, push: &SyncPush) -> io::Result<PushOutcome> {
        if let Some(stored) = self.items.get(&push.id) {
            if push.version < stored.version {
                return Ok(PushOutcome::Stale { stored: stored.version });
            }
            if push.version == stored.version {
                return Ok(PushOutcome::Duplicate);
            }
        }

        if let Some(path) = &self.path {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            let json = serde_json::to_string(push)?;
            writeln!(file, "{json}")?;
            file.sync_all()?;
        }

        self.items.insert(push.id.clone(), push.clone());
        Ok(PushOutcome::Applied)
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&SyncPush> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
