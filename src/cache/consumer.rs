// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Background worker draining the message cache into storage.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver};
use tracing::warn;

use crate::cache::message_cache::MessageCache;
use crate::core::{BagError, Result};
use crate::types::SerializedMessage;

/// How long `stop` waits for the drain before logging a warning.
const DRAIN_WARN_TIMEOUT: Duration = Duration::from_secs(5);

/// One background thread consuming cache batches.
///
/// Write failures inside the worker do not stop it: the first error is
/// parked in a slot for [`take_error`](CacheConsumer::take_error) and the
/// worker keeps draining so the producer never deadlocks on a full cache.
pub struct CacheConsumer {
    handle: Option<thread::JoinHandle<()>>,
    cache: Arc<MessageCache>,
    error: Arc<Mutex<Option<BagError>>>,
    done_rx: Receiver<()>,
}

impl CacheConsumer {
    /// Spawn the worker thread.
    ///
    /// `consume` is called once per taken batch; it performs the storage
    /// write and any flush-time metadata attribution.
    pub fn start<F>(cache: Arc<MessageCache>, mut consume: F) -> Result<Self>
    where
        F: FnMut(&[Arc<SerializedMessage>]) -> Result<()> + Send + 'static,
    {
        let error = Arc::new(Mutex::new(None));
        let (done_tx, done_rx) = bounded::<()>(1);

        let worker_cache = Arc::clone(&cache);
        let worker_error = Arc::clone(&error);
        let handle = thread::Builder::new()
            .name("robobag-cache-consumer".to_string())
            .spawn(move || {
                while let Some(batch) = worker_cache.wait_and_take() {
                    if let Err(e) = consume(&batch) {
                        warn!(error = %e, batch_len = batch.len(), "Failed to write cached batch");
                        let mut slot = worker_error.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                    }
                    worker_cache.batch_done();
                }
                let _ = done_tx.send(());
            })
            .map_err(|e| BagError::Other(format!("Failed to spawn cache consumer thread: {e}")))?;

        Ok(Self {
            handle: Some(handle),
            cache,
            error,
            done_rx,
        })
    }

    /// Take the first deferred write error, if any.
    pub fn take_error(&self) -> Option<BagError> {
        self.error.lock().unwrap().take()
    }

    /// Close the cache, wait for the drain, and join the worker.
    ///
    /// Returns the first deferred write error, including one raised while
    /// draining the final batches.
    pub fn stop(mut self) -> Option<BagError> {
        self.shutdown();
        self.take_error()
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.cache.close();
            if self.done_rx.recv_timeout(DRAIN_WARN_TIMEOUT).is_err() {
                warn!(
                    timeout_secs = DRAIN_WARN_TIMEOUT.as_secs(),
                    "Cache consumer still draining, waiting for it to finish"
                );
            }
            if handle.join().is_err() {
                warn!("Cache consumer thread panicked");
            }
        }
    }
}

impl Drop for CacheConsumer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
