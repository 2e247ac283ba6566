// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Sequential bag writer.
//!
//! [`SequentialWriter`] records serialized messages into a bag: a directory
//! holding one or more numbered storage files plus a `metadata.json` side
//! file. A session runs `open` → `create_topic` → `write`* → `close`, with
//! file rotation in between, either size-triggered or explicit.
//!
//! Recording modes, selected through [`StorageOptions`]:
//! - **direct** (`max_cache_size == 0`): every write reaches storage on the
//!   caller thread
//! - **cached** (`max_cache_size > 0`): writes land in a bounded FIFO and a
//!   background consumer drains them to storage in batches
//! - **snapshot** (`snapshot_mode`, requires a cache budget): writes land in
//!   a bounded circular buffer keeping only the newest messages, and reach
//!   storage only when [`SequentialWriter::take_snapshot`] flushes and
//!   rotates
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use robobag::convert::ConverterOptions;
//! use robobag::storage::StorageOptions;
//! use robobag::types::{SerializedMessage, TopicMetadata};
//! use robobag::writer::SequentialWriter;
//!
//! # fn main() -> robobag::core::Result<()> {
//! let mut writer = SequentialWriter::new();
//! writer.open(StorageOptions::new("/data/session"), ConverterOptions::default())?;
//! writer.create_topic(&TopicMetadata::new(0, "/chatter", "std_msgs/msg/String"))?;
//! writer.write(Arc::new(
//!     SerializedMessage::new("/chatter", vec![1, 2, 3]).with_timestamp(1_000),
//! ))?;
//! writer.close()?;
//! # Ok(())
//! # }
//! ```

pub mod events;

pub use events::{BagSplitInfo, WriterEventCallbacks};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::cache::{CacheConsumer, MessageCache};
use crate::convert::{Converter, ConverterFactory, ConverterOptions, RegistryConverterFactory};
use crate::core::{BagError, Result};
use crate::meta::{FileMetadataIo, MetadataAggregator, MetadataIo};
use crate::storage::{RegistryStorageFactory, StorageBackend, StorageFactory, StorageOptions};
use crate::types::{SerializedMessage, TopicMetadata};
use events::EventCallbackManager;

/// Everything that exists only while a bag is open.
struct OpenState {
    /// Options the bag was opened with
    storage_options: StorageOptions,
    /// Backend for the current physical file, shared with the consumer
    storage: Arc<Mutex<Box<dyn StorageBackend>>>,
    /// Statistics shared between the caller and the consumer
    aggregator: Arc<Mutex<MetadataAggregator>>,
    /// Loaded only when input and output formats differ
    converter: Option<Converter>,
    /// Present when `max_cache_size > 0`
    cache: Option<Arc<MessageCache>>,
    /// Worker draining the cache; present exactly when `cache` is
    consumer: Option<CacheConsumer>,
    /// Zero-based suffix of the current file
    file_index: usize,
    /// Full path of the current file, as handed to the factory
    current_file_path: PathBuf,
}

/// Writes messages into a bag, one physical file at a time.
///
/// The writer owns the whole recording lifecycle: it opens storage files
/// through a [`StorageFactory`], routes messages directly or through the
/// cache, keeps aggregate statistics current, rotates files, and persists
/// metadata both into the backend and to the `metadata.json` side file.
///
/// Dropping an open writer closes it, logging instead of returning errors.
pub struct SequentialWriter {
    storage_factory: Box<dyn StorageFactory>,
    converter_factory: Box<dyn ConverterFactory>,
    metadata_io: Box<dyn MetadataIo>,
    callbacks: EventCallbackManager,
    state: Option<OpenState>,
}

impl SequentialWriter {
    /// Create a writer backed by the global storage and converter
    /// registries, writing `metadata.json` to disk.
    pub fn new() -> Self {
        Self::with_components(
            Box::new(RegistryStorageFactory),
            Box::new(RegistryConverterFactory),
            Box::new(FileMetadataIo::new()),
        )
    }

    /// Create a writer with explicit components.
    pub fn with_components(
        storage_factory: Box<dyn StorageFactory>,
        converter_factory: Box<dyn ConverterFactory>,
        metadata_io: Box<dyn MetadataIo>,
    ) -> Self {
        Self {
            storage_factory,
            converter_factory,
            metadata_io,
            callbacks: EventCallbackManager::new(),
            state: None,
        }
    }

    /// Whether a bag is currently open.
    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Register callbacks for writer events.
    ///
    /// May be called any number of times, before or after `open`. Every
    /// registered split callback fires once per rotation and once on close,
    /// on the thread performing the rotation.
    pub fn add_event_callbacks(&mut self, callbacks: WriterEventCallbacks) {
        self.callbacks.add(callbacks);
    }

    /// Open a bag for recording.
    ///
    /// Creates the bag directory, opens the first file
    /// `<uri>/<basename(uri)>_0` through the factory, and persists an
    /// initial metadata snapshot to the backend. With a cache budget the
    /// background consumer starts here.
    ///
    /// # Errors
    ///
    /// `AlreadyOpen` when a bag is open; `ConverterNotFound` when formats
    /// differ and a plugin is missing; `InvalidSnapshotConfig` for snapshot
    /// mode without a cache budget (checked before any file is created);
    /// `InvalidSplitSize` when `max_bagfile_size` is non-zero but below the
    /// backend minimum; storage errors from the factory propagate.
    pub fn open(
        &mut self,
        storage_options: StorageOptions,
        converter_options: ConverterOptions,
    ) -> Result<()> {
        if self.state.is_some() {
            return Err(BagError::AlreadyOpen);
        }

        // Equal formats never consult the factory.
        let converter = if converter_options.needs_conversion() {
            Some(Converter::new(
                self.converter_factory.as_ref(),
                &converter_options,
            )?)
        } else {
            None
        };

        if storage_options.snapshot_mode && storage_options.max_cache_size == 0 {
            return Err(BagError::InvalidSnapshotConfig);
        }

        fs::create_dir_all(&storage_options.uri).map_err(|e| {
            BagError::storage(
                "open",
                format!(
                    "Failed to create bag directory {}: {e}",
                    storage_options.uri.display()
                ),
            )
        })?;

        let first_path = format_storage_uri(&storage_options.uri, 0);
        let mut storage = self
            .storage_factory
            .open_read_write(&storage_options.for_file(&first_path))?;

        if storage_options.max_bagfile_size > 0 {
            let minimum = storage.get_minimum_split_file_size();
            if storage_options.max_bagfile_size < minimum {
                return Err(BagError::invalid_split_size(
                    storage_options.max_bagfile_size,
                    minimum,
                ));
            }
        }

        let aggregator = MetadataAggregator::new(
            storage.get_storage_identifier(),
            storage_options.compression_format.clone(),
            storage_options.compression_mode.clone(),
            strip_parent_path(&storage.get_relative_file_path()),
        );
        storage.update_metadata(&aggregator.snapshot())?;

        let storage = Arc::new(Mutex::new(storage));
        let aggregator = Arc::new(Mutex::new(aggregator));

        let (cache, consumer) = if storage_options.max_cache_size > 0 {
            let cache = Arc::new(MessageCache::new(
                storage_options.max_cache_size,
                storage_options.snapshot_mode,
            ));
            let consumer = if storage_options.snapshot_mode {
                // Snapshot batches are attributed at flush time, from the
                // consumer thread.
                let storage = Arc::clone(&storage);
                let aggregator = Arc::clone(&aggregator);
                CacheConsumer::start(Arc::clone(&cache), move |batch| {
                    storage.lock().unwrap().write_batch(batch)?;
                    aggregator.lock().unwrap().attribute_flushed_batch(batch);
                    Ok(())
                })?
            } else {
                let storage = Arc::clone(&storage);
                CacheConsumer::start(Arc::clone(&cache), move |batch| {
                    storage.lock().unwrap().write_batch(batch)
                })?
            };
            (Some(cache), Some(consumer))
        } else {
            (None, None)
        };

        debug!(
            uri = %storage_options.uri.display(),
            cache_bytes = storage_options.max_cache_size,
            snapshot = storage_options.snapshot_mode,
            "Opened bag"
        );

        self.state = Some(OpenState {
            storage_options,
            storage,
            aggregator,
            converter,
            cache,
            consumer,
            file_index: 0,
            current_file_path: first_path,
        });
        Ok(())
    }

    /// Register a topic for recording.
    ///
    /// Identical re-registration is a no-op; a conflicting one fails with
    /// `TopicAlreadyRegistered` and leaves the table untouched.
    pub fn create_topic(&mut self, topic: &TopicMetadata) -> Result<()> {
        let state = self.open_state("create_topic()")?;
        state.aggregator.lock().unwrap().register_topic(topic)
    }

    /// Remove a topic from the recording table.
    ///
    /// Subsequent writes to the topic fail with `UnknownTopic`. Stats of
    /// already-finalized files keep the topic's messages, but the topic row
    /// leaves the table, so aggregate counts derived from it shrink at the
    /// next finalize.
    pub fn remove_topic(&mut self, topic: &TopicMetadata) -> Result<()> {
        let state = self.open_state("remove_topic()")?;
        state
            .aggregator
            .lock()
            .unwrap()
            .unregister_topic(&topic.name)
    }

    /// Write one message to the bag.
    ///
    /// The topic must be registered. When a size limit is configured and
    /// the current file has reached it, the file rotates before this
    /// message is admitted, so the message lands in the new file.
    pub fn write(&mut self, message: Arc<SerializedMessage>) -> Result<()> {
        let (message, needs_split) = {
            let state = self.open_state("write()")?;
            if !state.aggregator.lock().unwrap().has_topic(&message.topic_name) {
                return Err(BagError::unknown_topic(&message.topic_name));
            }
            let message = match &state.converter {
                Some(converter) => Arc::new(converter.convert(&message)?),
                None => message,
            };
            let needs_split = state.storage_options.max_bagfile_size > 0
                && state.storage.lock().unwrap().get_bagfile_size()
                    >= state.storage_options.max_bagfile_size;
            (message, needs_split)
        };

        if needs_split {
            self.split_bagfile()?;
        }

        let state = self.open_state("write()")?;
        {
            let mut aggregator = state.aggregator.lock().unwrap();
            aggregator.observe_admitted(&message);
            // Snapshot mode defers counting to flush time; evicted
            // messages must never be counted.
            if !state.storage_options.snapshot_mode {
                aggregator.attribute_message(&message);
            }
        }
        match &state.cache {
            Some(cache) => cache.push(message),
            None => state.storage.lock().unwrap().write(&message)?,
        }
        Ok(())
    }

    /// Close the current file and continue recording into the next one.
    ///
    /// Drains the cache first so the closing file's statistics are final,
    /// persists the metadata snapshot on the closing backend and again on
    /// the newly opened one, then fires the split callbacks. A deferred
    /// consumer error surfaces here and aborts the split. If opening the
    /// next file fails, the writer stays on the current file.
    pub fn split_bagfile(&mut self) -> Result<()> {
        let state = match self.state.as_mut() {
            Some(state) => state,
            None => return Err(BagError::not_open("split_bagfile()")),
        };

        if let Some(cache) = &state.cache {
            cache.flush_and_wait();
        }
        if let Some(consumer) = &state.consumer {
            if let Some(err) = consumer.take_error() {
                return Err(err);
            }
        }

        let closed_size = state.storage.lock().unwrap().get_bagfile_size();
        let snapshot = {
            let mut aggregator = state.aggregator.lock().unwrap();
            aggregator.finalize_current_file(closed_size);
            aggregator.snapshot()
        };
        state.storage.lock().unwrap().update_metadata(&snapshot)?;

        let next_index = state.file_index + 1;
        let next_path = format_storage_uri(&state.storage_options.uri, next_index);
        let mut next_storage = self
            .storage_factory
            .open_read_write(&state.storage_options.for_file(&next_path))?;
        // The new backend receives the same snapshot: completed files plus
        // the one just closed, nothing about itself yet.
        next_storage.update_metadata(&snapshot)?;

        let closed_file = state.current_file_path.to_string_lossy().into_owned();
        let opened_file = next_path.to_string_lossy().into_owned();

        let stripped = strip_parent_path(&next_storage.get_relative_file_path());
        *state.storage.lock().unwrap() = next_storage;
        state.aggregator.lock().unwrap().start_new_file(stripped);
        state.file_index = next_index;
        state.current_file_path = next_path;

        debug!(closed = %closed_file, opened = %opened_file, "Split bagfile");

        let info = BagSplitInfo {
            closed_file,
            opened_file,
        };
        self.callbacks.fire_split(&info);
        Ok(())
    }

    /// Flush the snapshot buffer into the current file and rotate.
    ///
    /// Returns `Ok(false)` with a warning when the bag is not in snapshot
    /// mode. An empty buffer still rotates, so repeated snapshots produce
    /// strictly incrementing file suffixes.
    pub fn take_snapshot(&mut self) -> Result<bool> {
        let snapshot_mode = {
            let state = self.open_state("take_snapshot()")?;
            state.storage_options.snapshot_mode
        };
        if !snapshot_mode {
            warn!("take_snapshot() requested on a bag not in snapshot mode");
            return Ok(false);
        }
        // The drain barrier inside the split flushes the circular buffer
        // into the closing file.
        self.split_bagfile()?;
        Ok(true)
    }

    /// Close the bag.
    ///
    /// Stops the consumer (draining a FIFO to empty, discarding unflushed
    /// snapshot messages), finalizes the last file, persists the final
    /// metadata snapshot to the backend, writes `metadata.json` exactly
    /// once, and fires one callback with an empty `opened_file`. Close
    /// always runs to completion; the first error encountered is returned
    /// after the writer is fully closed. A second `close()` is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut state) = self.state.take() else {
            return Ok(());
        };

        debug!(uri = %state.storage_options.uri.display(), "Closing bag");

        let mut first_error: Option<BagError> = None;

        if let Some(consumer) = state.consumer.take() {
            if let Some(err) = consumer.stop() {
                warn!(error = %err, "Cache consumer reported a deferred write error");
                first_error.get_or_insert(err);
            }
        }

        let closed_size = state.storage.lock().unwrap().get_bagfile_size();
        let snapshot = {
            let mut aggregator = state.aggregator.lock().unwrap();
            aggregator.finalize_current_file(closed_size);
            aggregator.snapshot()
        };
        if let Err(err) = state.storage.lock().unwrap().update_metadata(&snapshot) {
            warn!(error = %err, "Failed to persist final metadata to storage");
            first_error.get_or_insert(err);
        }
        if let Err(err) = self
            .metadata_io
            .write_metadata(&state.storage_options.uri, &snapshot)
        {
            warn!(error = %err, "Failed to write metadata file");
            first_error.get_or_insert(err);
        }

        let info = BagSplitInfo {
            closed_file: state.current_file_path.to_string_lossy().into_owned(),
            opened_file: String::new(),
        };
        self.callbacks.fire_split(&info);

        // Dropping the state releases the backend and flushes its file.
        drop(state);

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn open_state(&mut self, operation: &str) -> Result<&mut OpenState> {
        self.state
            .as_mut()
            .ok_or_else(|| BagError::not_open(operation))
    }
}

impl Default for SequentialWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SequentialWriter {
    fn drop(&mut self) {
        if self.state.is_some() {
            debug!("Writer dropped while open; closing");
            if let Err(err) = self.close() {
                warn!(error = %err, "Failed to close bag while dropping writer");
            }
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Compose the path of physical file `index`: `<uri>/<basename(uri)>_<index>`.
fn format_storage_uri(base: &Path, index: usize) -> PathBuf {
    let stem = base
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    base.join(format!("{stem}_{index}"))
}

/// Reduce a file path to its bare file name, as stored in the metadata's
/// relative paths.
fn strip_parent_path(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
