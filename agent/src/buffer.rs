//! Ordered in-memory event queue.
//!
//! The buffer owns every captured event between capture and acknowledged
//! delivery. A flush swaps the whole queue out in one step; a failed delivery
//! puts the swapped-out batch back in front of whatever was captured while the
//! batch was in flight, so the merged queue is still in capture order.
//!
//! The queue is unbounded unless a maximum length is configured, in which case
//! the oldest events are evicted first.

use std::collections::VecDeque;

use tracing::warn;

use crate::types::CapturedEvent;

/// Ordered queue of captured events awaiting delivery.
#[derive(Debug, Default)]
pub struct EventBuffer {
    queue: VecDeque<CapturedEvent>,
    max_len: Option<usize>,
}

impl EventBuffer {
    /// Creates an unbounded buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer that evicts its oldest events beyond `max_len`.
    ///
    /// A `max_len` of zero is treated as one.
    #[must_use]
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            max_len: Some(max_len.max(1)),
        }
    }

    /// Appends an event to the tail of the queue.
    ///
    /// # Returns
    ///
    /// The number of events evicted (always 0 for an unbounded buffer).
    pub fn enqueue(&mut self, event: CapturedEvent) -> usize {
        self.queue.push_back(event);
        self.enforce_limit()
    }

    /// Takes the entire queue for transmission, leaving it empty.
    ///
    /// Returns `None` when there is nothing to send, so callers can skip the
    /// network round trip entirely.
    pub fn flush(&mut self) -> Option<Vec<CapturedEvent>> {
        if self.queue.is_empty() {
            return None;
        }

        Some(std::mem::take(&mut self.queue).into())
    }

    /// Reinserts a failed batch ahead of everything enqueued since it was taken.
    ///
    /// # Returns
    ///
    /// The number of events evicted (always 0 for an unbounded buffer).
    pub fn requeue_front(&mut self, batch: Vec<CapturedEvent>) -> usize {
        if batch.is_empty() {
            return 0;
        }

        let arrived_during_flight = std::mem::take(&mut self.queue);
        let mut merged = VecDeque::from(batch);
        merged.extend(arrived_during_flight);
        self.queue = merged;

        self.enforce_limit()
    }

    /// Returns the number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if no events are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn enforce_limit(&mut self) -> usize {
        let Some(max_len) = self.max_len else {
            return 0;
        };

        let mut evicted = 0;
        while self.queue.len() > max_len {
            self.queue.pop_front();
            evicted += 1;
        }

        if evicted > 0 {
            warn!(evicted_count = evicted, "Queue limit reached, oldest events evicted");
        }

        evicted
    }
}
