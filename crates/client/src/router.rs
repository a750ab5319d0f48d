// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription registry and inbound dispatch.
//!
//! Dispatch snapshots the matching subscriptions under the registry lock,
//! releases it, then invokes callbacks. Callbacks may therefore subscribe,
//! unsubscribe or send from inside a callback without deadlocking.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use fl_core::{Envelope, Priority};
use serde_json::{Map, Value};

use crate::error::Error;

/// Exact-match key subset required of `envelope.data`.
pub type Filter = Map<String, Value>;

/// Subscriber callback. Receives the full `envelope.data`.
pub type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Opaque, process-unique subscription handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

fn next_subscription_id() -> (SubscriptionId, u64) {
    let seq = NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed);
    (SubscriptionId(format!("sub-{seq}")), seq)
}

struct Subscription {
    id: SubscriptionId,
    seq: u64,
    event_type: String,
    filter: Option<Filter>,
    priority: Priority,
    callback: Callback,
    active: AtomicBool,
}

impl Subscription {
    fn accepts(&self, envelope: &Envelope) -> bool {
        if self.event_type != envelope.event_type {
            return false;
        }
        match &self.filter {
            Some(filter) => matches(filter, &envelope.data),
            None => true,
        }
    }
}

/// Returns true if every filter key is present in `data` with an equal value.
///
/// An empty filter matches any payload. A non-object payload only matches
/// the empty filter.
pub fn matches(filter: &Filter, data: &Value) -> bool {
    if filter.is_empty() {
        return true;
    }
    match data.as_object() {
        Some(object) => filter.iter().all(|(key, want)| object.get(key) == Some(want)),
        None => false,
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Routes inbound envelopes to registered callbacks.
pub struct SubscriptionRouter {
    subscriptions: Mutex<HashMap<SubscriptionId, Arc<Subscription>>>,
    error_count: AtomicU64,
}

impl SubscriptionRouter {
    pub fn new() -> Self {
        SubscriptionRouter { subscriptions: Mutex::new(HashMap::new()), error_count: AtomicU64::new(0) }
    }

    /// Registers a callback for every envelope of `event_type`.
    pub fn subscribe<F>(&self, event_type: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe_filtered(event_type, None, Priority::Normal, callback)
    }

    /// Registers a callback restricted by `filter`.
    ///
    /// Higher `priority` subscriptions are called first for the same envelope.
    pub fn subscribe_filtered<F>(
        &self,
        event_type: impl Into<String>,
        filter: Option<Filter>,
        priority: Priority,
        callback: F,
    ) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let (id, seq) = next_subscription_id();
        let subscription = Arc::new(Subscription {
            id: id.clone(),
            seq,
            event_type: event_type.into(),
            filter,
            priority,
            callback: Arc::new(callback),
            active: AtomicBool::new(true),
        });
        tracing::debug!(id = %id, event_type = %subscription.event_type, "subscribed");
        self.lock().insert(id.clone(), subscription);
        id
    }

    /// Removes one subscription. Returns false for unknown ids.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        match self.lock().remove(id) {
            Some(subscription) => {
                subscription.active.store(false, Ordering::Release);
                tracing::debug!(id = %id, "unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Delivers `envelope.data` to every matching subscription.
    ///
    /// A panicking callback is logged and counted; the remaining callbacks
    /// still run.
    pub fn dispatch(&self, envelope: &Envelope) -> DispatchReport {
        let mut targets: Vec<Arc<Subscription>> =
            self.lock().values().filter(|s| s.accepts(envelope)).cloned().collect();
        targets.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));

        let mut report = DispatchReport::default();
        for subscription in targets {
            // Unsubscribed by an earlier callback of this same dispatch
            if !subscription.active.load(Ordering::Acquire) {
                continue;
            }
            let callback = &subscription.callback;
            match panic::catch_unwind(AssertUnwindSafe(|| callback(&envelope.data))) {
                Ok(()) => report.delivered += 1,
                Err(payload) => {
                    report.failed += 1;
                    self.error_count.fetch_add(1, Ordering::Relaxed);
                    let err = Error::Subscriber {
                        subscription: subscription.id.to_string(),
                        message: panic_message(payload.as_ref()),
                    };
                    tracing::error!(event_type = %envelope.event_type, "{err}");
                }
            }
        }
        report
    }

    /// Number of callbacks that panicked since creation.
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disables and removes every subscription.
    pub fn close(&self) {
        let drained: Vec<_> = self.lock().drain().collect();
        for (_, subscription) in &drained {
            subscription.active.store(false, Ordering::Release);
        }
        tracing::debug!(count = drained.len(), "router closed");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, Arc<Subscription>>> {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SubscriptionRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked".to_string()
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
