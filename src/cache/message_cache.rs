// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Producer/consumer cache between message admission and storage writes.
//!
//! One producer (the writer's caller thread) pushes messages; one consumer
//! (the [`CacheConsumer`](crate::cache::CacheConsumer) worker) takes them in
//! arrival-driven batches. The buffer policy depends on the recording mode:
//!
//! - Normal recording uses a FIFO buffer. The producer blocks while the byte
//!   budget is exhausted; nothing is ever dropped.
//! - Snapshot recording uses a circular buffer. The producer never blocks,
//!   the oldest messages are evicted, and the consumer only wakes when a
//!   flush is requested.

use std::sync::{Arc, Condvar, Mutex};

use tracing::{debug, warn};

use crate::cache::buffer::{CacheBuffer, CircularBuffer, FifoBuffer};
use crate::types::SerializedMessage;

struct CacheState {
    buffer: Box<dyn CacheBuffer>,
    /// A taken batch is being written by the consumer
    in_flight: bool,
    /// Snapshot flush pending consumer acknowledgement
    flush_requested: bool,
    closed: bool,
}

/// Thread-safe message cache shared by producer and consumer.
///
/// Split and close drain through [`flush_and_wait`](MessageCache::flush_and_wait),
/// which returns only once the buffer is empty, no batch is in flight, and
/// any flush request has been acknowledged.
pub struct MessageCache {
    state: Mutex<CacheState>,
    /// Consumer wakeup: data arrived, flush requested, or closing
    data_ready: Condvar,
    /// Producer wakeup: budget freed or closing
    space_free: Condvar,
    /// Barrier wakeup: batch finished or flush acknowledged
    drained: Condvar,
    snapshot_mode: bool,
}

impl MessageCache {
    /// Create a cache with the given payload byte budget.
    ///
    /// `snapshot_mode` selects the circular buffer policy.
    pub fn new(max_cache_size: u64, snapshot_mode: bool) -> Self {
        let buffer: Box<dyn CacheBuffer> = if snapshot_mode {
            Box::new(CircularBuffer::new(max_cache_size))
        } else {
            Box::new(FifoBuffer::new(max_cache_size))
        };

        Self {
            state: Mutex::new(CacheState {
                buffer,
                in_flight: false,
                flush_requested: false,
                closed: false,
            }),
            data_ready: Condvar::new(),
            space_free: Condvar::new(),
            drained: Condvar::new(),
            snapshot_mode,
        }
    }

    /// Add a message.
    ///
    /// FIFO policy blocks while the budget is exhausted; circular policy
    /// evicts and returns immediately. Messages pushed after [`close`]
    /// are dropped.
    ///
    /// [`close`]: MessageCache::close
    pub fn push(&self, message: Arc<SerializedMessage>) {
        let mut state = self.state.lock().unwrap();

        if self.snapshot_mode {
            if state.closed {
                debug!(topic = %message.topic_name, "Cache closed, dropping message");
                return;
            }
            if !state.buffer.push(Arc::clone(&message)) {
                warn!(
                    topic = %message.topic_name,
                    bytes = message.len(),
                    "Message larger than the whole snapshot buffer, dropping"
                );
            }
            return;
        }

        while state.buffer.is_full() && !state.closed {
            state = self.space_free.wait(state).unwrap();
        }
        if state.closed {
            debug!(topic = %message.topic_name, "Cache closed, dropping message");
            return;
        }
        state.buffer.push(message);
        self.data_ready.notify_one();
    }

    /// Consumer side: block until a batch is available, then take it.
    ///
    /// Returns everything accumulated since the last take as one batch, or
    /// `None` once the cache is closed and, under the FIFO policy, fully
    /// drained. The caller must call [`batch_done`](MessageCache::batch_done)
    /// after writing the batch.
    pub fn wait_and_take(&self) -> Option<Vec<Arc<SerializedMessage>>> {
        let mut state = self.state.lock().unwrap();

        loop {
            if self.snapshot_mode {
                while !state.flush_requested && !state.closed {
                    state = self.data_ready.wait(state).unwrap();
                }
                if state.flush_requested {
                    state.flush_requested = false;
                    if !state.buffer.is_empty() {
                        let batch = state.buffer.take_all();
                        state.in_flight = true;
                        return Some(batch);
                    }
                    // Nothing buffered; acknowledge the flush
                    self.drained.notify_all();
                    continue;
                }
                return None;
            }

            // FIFO keeps draining after close so nothing is lost
            if !state.buffer.is_empty() {
                let batch = state.buffer.take_all();
                state.in_flight = true;
                self.space_free.notify_all();
                return Some(batch);
            }
            if state.closed {
                return None;
            }
            state = self.data_ready.wait(state).unwrap();
        }
    }

    /// Consumer side: mark the batch taken by the last
    /// [`wait_and_take`](MessageCache::wait_and_take) as written.
    pub fn batch_done(&self) {
        let mut state = self.state.lock().unwrap();
        state.in_flight = false;
        self.drained.notify_all();
    }

    /// Drain barrier used by split and close.
    ///
    /// In snapshot mode this first requests a flush so the consumer takes
    /// the buffered batch. Returns once the buffer is empty, no batch is in
    /// flight, and the flush request (if any) was acknowledged.
    pub fn flush_and_wait(&self) {
        let mut state = self.state.lock().unwrap();

        if self.snapshot_mode {
            state.flush_requested = true;
            self.data_ready.notify_all();
        }

        while !state.buffer.is_empty() || state.in_flight || state.flush_requested {
            state = self.drained.wait(state).unwrap();
        }
    }

    /// Close the cache, waking all waiters.
    ///
    /// Under the FIFO policy the consumer still drains what is buffered;
    /// under the circular policy unflushed messages are discarded.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.closed = true;

        if self.snapshot_mode && !state.buffer.is_empty() {
            debug!(
                count = state.buffer.len(),
                bytes = state.buffer.size_bytes(),
                "Discarding unflushed snapshot messages"
            );
            state.buffer.take_all();
        }

        self.data_ready.notify_all();
        self.space_free.notify_all();
        self.drained.notify_all();
    }

    /// Number of buffered messages.
    pub fn pending_len(&self) -> usize {
        self.state.lock().unwrap().buffer.len()
    }

    /// Buffered payload bytes.
    pub fn pending_bytes(&self) -> u64 {
        self.state.lock().unwrap().buffer.size_bytes()
    }
}
