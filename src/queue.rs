//! Bounded outbound message queue.
//!
//! Holds messages composed while disconnected or mid-reconnect. Bounded and
//! lossy under sustained disconnection: at capacity the oldest entry is
//! evicted before a new one is admitted. Draining uses a snapshot-then-clear
//! discipline so a message enqueued synchronously during a drain is never
//! sent twice.

use std::collections::VecDeque;

use crate::message::OutboundMessage;

/// FIFO buffer of not-yet-sent messages.
#[derive(Debug)]
pub struct OutboundQueue {
    entries: VecDeque<OutboundMessage>,
    capacity: usize,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
        }
    }

    /// Append a message, evicting the oldest entry at capacity.
    pub fn push(&mut self, message: OutboundMessage) {
        if self.entries.len() >= self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                tracing::warn!(
                    message_type = %evicted.message_type,
                    capacity = self.capacity,
                    "Outbound queue full, evicting oldest message"
                );
            }
        }
        self.entries.push_back(message);
    }

    /// Take an immutable snapshot of the pending messages and clear the
    /// live queue. Messages enqueued after this call belong to the next
    /// drain.
    pub fn take_snapshot(&mut self) -> Vec<OutboundMessage> {
        self.entries.drain(..).collect()
    }

    /// Put messages that failed to transmit back at the head of the queue,
    /// preserving their relative order ahead of anything enqueued since the
    /// snapshot was taken.
    pub fn requeue_front(&mut self, failed: Vec<OutboundMessage>) {
        for message in failed.into_iter().rev() {
            self.entries.push_front(message);
        }
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Number of pending messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
