// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Asynchronous caching stage between message admission and storage.
//!
//! This module decouples `write` calls from physical storage writes:
//! - [`buffer`] - Byte-budgeted FIFO and circular buffers
//! - [`message_cache`] - Thread-safe cache shared by producer and consumer
//! - [`consumer`] - Background worker draining batches into storage

pub mod buffer;
pub mod consumer;
pub mod message_cache;

pub use buffer::{CacheBuffer, CircularBuffer, FifoBuffer};
pub use consumer::CacheConsumer;
pub use message_cache::MessageCache;
