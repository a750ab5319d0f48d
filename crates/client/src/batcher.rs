// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound priority batching.
//!
//! Four FIFO queues, one per priority. A drain empties them CRITICAL first,
//! then HIGH, NORMAL and LOW. The batcher has no timers of its own: the
//! connection driver arms the flush deadline and acts on [`Admission`].

use std::collections::VecDeque;

use fl_core::{Envelope, Frame, Priority};

/// What the caller must do with an envelope offered to the batcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Send now as its own frame (CRITICAL while connected).
    Bypass(Envelope),
    /// Queued. `flush` is set once the batch size threshold is reached.
    Queued { flush: bool },
    /// Not connected: hand to the offline store.
    Offline(Envelope),
    /// Not connected and transient: discard.
    Dropped,
}

/// Per-priority outbound queues.
#[derive(Debug)]
pub struct PriorityBatcher {
    queues: [VecDeque<Envelope>; 4],
    batch_size: usize,
}

impl PriorityBatcher {
    pub fn new(batch_size: usize) -> Self {
        PriorityBatcher { queues: Default::default(), batch_size: batch_size.max(1) }
    }

    /// Offers an envelope. Its own `priority` field selects the queue.
    pub fn admit(&mut self, envelope: Envelope, connected: bool) -> Admission {
        if !connected {
            return if envelope.is_transient() { Admission::Dropped } else { Admission::Offline(envelope) };
        }
        if envelope.priority == Priority::Critical {
            return Admission::Bypass(envelope);
        }
        self.queues[envelope.priority.index()].push_back(envelope);
        Admission::Queued { flush: self.len() >= self.batch_size }
    }

    /// Empties every queue in flush order.
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut out = Vec::with_capacity(self.len());
        for priority in Priority::ALL {
            out.extend(self.queues[priority.index()].drain(..));
        }
        out
    }

    /// Empties every queue, discarding transient envelopes.
    pub fn drain_persistable(&mut self) -> Vec<Envelope> {
        self.drain().into_iter().filter(|e| !e.is_transient()).collect()
    }

    pub fn len(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(VecDeque::is_empty)
    }

    pub fn queued(&self, priority: Priority) -> usize {
        self.queues[priority.index()].len()
    }
}

/// Splits an ordered envelope list into frames of at most `max` envelopes.
pub fn into_frames(envelopes: Vec<Envelope>, max: usize) -> Vec<Frame> {
    let max = max.max(1);
    let mut frames = Vec::with_capacity(envelopes.len().div_ceil(max));
    let mut chunk = Vec::with_capacity(max.min(envelopes.len()));
    for envelope in envelopes {
        chunk.push(envelope);
        if chunk.len() == max {
            frames.extend(Frame::from_envelopes(std::mem::take(&mut chunk)).ok());
        }
    }
    if !chunk.is_empty() {
        frames.extend(Frame::from_envelopes(chunk).ok());
    }
    frames
}

#[cfg(test)]
#[path = "batcher_tests.rs"]
mod tests;
