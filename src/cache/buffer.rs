// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Byte-budgeted message buffers backing the cache.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::types::SerializedMessage;

/// A byte-budgeted buffer of pending messages.
///
/// The budget counts payload bytes only. The two policies differ in how they
/// handle overflow: FIFO reports itself full and lets the cache block the
/// producer, circular evicts its oldest entries.
pub trait CacheBuffer: Send {
    /// Add one message, applying this buffer's overflow policy.
    ///
    /// Returns `false` when the policy rejected the message outright.
    fn push(&mut self, message: Arc<SerializedMessage>) -> bool;

    /// Whether the budget is exhausted and the producer should wait.
    fn is_full(&self) -> bool;

    /// Take every buffered message, oldest first, leaving the buffer empty.
    fn take_all(&mut self) -> Vec<Arc<SerializedMessage>>;

    /// Buffered payload bytes.
    fn size_bytes(&self) -> u64;

    /// Number of buffered messages.
    fn len(&self) -> usize;

    /// Whether the buffer holds no messages.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// FIFO buffer: admits while under budget, never drops.
///
/// A message is admitted whenever the buffer is below the budget, so one
/// oversized message can take the buffer past it; later pushes then wait
/// until the consumer drains.
pub struct FifoBuffer {
    messages: VecDeque<Arc<SerializedMessage>>,
    size_bytes: u64,
    max_size_bytes: u64,
}

impl FifoBuffer {
    /// Create a FIFO buffer with the given payload byte budget.
    pub fn new(max_size_bytes: u64) -> Self {
        Self {
            messages: VecDeque::new(),
            size_bytes: 0,
            max_size_bytes,
        }
    }
}

impl CacheBuffer for FifoBuffer {
    fn push(&mut self, message: Arc<SerializedMessage>) -> bool {
        self.size_bytes += message.len() as u64;
        self.messages.push_back(message);
        true
    }

    fn is_full(&self) -> bool {
        self.size_bytes >= self.max_size_bytes
    }

    fn take_all(&mut self) -> Vec<Arc<SerializedMessage>> {
        self.size_bytes = 0;
        self.messages.drain(..).collect()
    }

    fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    fn len(&self) -> usize {
        self.messages.len()
    }
}

/// Circular buffer: keeps the newest messages, evicting the oldest.
///
/// Never reports full and never blocks a producer. A single message larger
/// than the whole budget is rejected.
pub struct CircularBuffer {
    messages: VecDeque<Arc<SerializedMessage>>,
    size_bytes: u64,
    max_size_bytes: u64,
}

impl CircularBuffer {
    /// Create a circular buffer with the given payload byte budget.
    pub fn new(max_size_bytes: u64) -> Self {
        Self {
            messages: VecDeque::new(),
            size_bytes: 0,
            max_size_bytes,
        }
    }
}

impl CacheBuffer for CircularBuffer {
    fn push(&mut self, message: Arc<SerializedMessage>) -> bool {
        let incoming = message.len() as u64;
        if incoming > self.max_size_bytes {
            return false;
        }

        while self.size_bytes + incoming > self.max_size_bytes {
            match self.messages.pop_front() {
                Some(evicted) => self.size_bytes -= evicted.len() as u64,
                None => break,
            }
        }

        self.size_bytes += incoming;
        self.messages.push_back(message);
        true
    }

    fn is_full(&self) -> bool {
        false
    }

    fn take_all(&mut self) -> Vec<Arc<SerializedMessage>> {
        self.size_bytes = 0;
        self.messages.drain(..).collect()
    }

    fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    fn len(&self) -> usize {
        self.messages.len()
    }
}
