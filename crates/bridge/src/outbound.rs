//! Disconnect buffer: envelopes produced while the bridge is not
//! connected wait here, bounded, oldest dropped first, and flush in
//! original order on reconnect.

use std::collections::VecDeque;

use benchlink_protocol::Envelope;

pub struct OutboundQueue {
    capacity: usize,
    queue: VecDeque<Envelope>,
}

impl OutboundQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    /// Enqueue an envelope. When full, the oldest envelope is dropped and
    /// returned so the caller can report it.
    pub fn push(&mut self, envelope: Envelope) -> Option<Envelope> {
        let dropped = if self.queue.len() == self.capacity {
            self.queue.pop_front()
        } else {
            None
        };
        self.queue.push_back(envelope);
        dropped
    }

    /// Remove everything, in insertion order.
    pub fn drain(&mut self) -> Vec<Envelope> {
        self.queue.drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
