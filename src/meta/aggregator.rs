// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Running aggregation of bag statistics.
//!
//! The aggregator is the single owner of the topic table and of the time and
//! count bookkeeping behind [`BagMetadata`]. The writer updates it as
//! messages are admitted; the cache consumer updates it when snapshot
//! batches flush. Bag-level time bounds always reflect admitted messages,
//! while message counts reflect the mode's attribution point, so an evicted
//! snapshot message widens the bag time range without ever being counted.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::core::{BagError, Result};
use crate::meta::{BagMetadata, FileInfo};
use crate::types::{SerializedMessage, TopicInformation, TopicMetadata};

/// Accumulates per-bag and per-file statistics across a recording session.
#[derive(Debug)]
pub struct MetadataAggregator {
    /// Static part of the metadata (files, paths, compression, identity)
    metadata: BagMetadata,
    /// Registered topics by name, with running counts
    topics: BTreeMap<String, TopicInformation>,
    /// Earliest admitted message timestamp
    bag_min_time: Option<u64>,
    /// Latest admitted message timestamp
    bag_max_time: Option<u64>,
    /// Earliest attributed message timestamp in the current file
    file_min_time: Option<u64>,
    /// Latest attributed message timestamp in the current file
    file_max_time: Option<u64>,
    /// Messages attributed before the current file opened
    file_base_count: u64,
    /// Summed on-disk sizes of files already rotated away
    completed_size: u64,
    /// On-disk size the latest finalize reported for the current file
    current_file_size: u64,
}

impl MetadataAggregator {
    /// Create an aggregator for a freshly opened bag.
    ///
    /// `first_relative_path` is the stripped file name of the first physical
    /// file, which is registered immediately with an empty [`FileInfo`].
    pub fn new(
        storage_identifier: impl Into<String>,
        compression_format: impl Into<String>,
        compression_mode: impl Into<String>,
        first_relative_path: impl Into<String>,
    ) -> Self {
        let mut metadata = BagMetadata::new(storage_identifier);
        metadata.compression_format = compression_format.into();
        metadata.compression_mode = compression_mode.into();
        let first = first_relative_path.into();
        metadata.relative_file_paths.push(first.clone());
        metadata.files.push(FileInfo::new(first));

        Self {
            metadata,
            topics: BTreeMap::new(),
            bag_min_time: None,
            bag_max_time: None,
            file_min_time: None,
            file_max_time: None,
            file_base_count: 0,
            completed_size: 0,
            current_file_size: 0,
        }
    }

    /// Register a topic. Identical re-registration is a no-op; conflicting
    /// re-registration fails without touching the table.
    pub fn register_topic(&mut self, topic: &TopicMetadata) -> Result<()> {
        if let Some(existing) = self.topics.get(&topic.name) {
            if existing.topic_metadata == *topic {
                return Ok(());
            }
            return Err(BagError::topic_already_registered(&topic.name));
        }
        self.topics
            .insert(topic.name.clone(), TopicInformation::new(topic.clone()));
        Ok(())
    }

    /// Remove a topic from the table. Unknown names fail.
    pub fn unregister_topic(&mut self, name: &str) -> Result<()> {
        if self.topics.remove(name).is_none() {
            return Err(BagError::unknown_topic(name));
        }
        Ok(())
    }

    /// Check whether a topic is registered.
    pub fn has_topic(&self, name: &str) -> bool {
        self.topics.contains_key(name)
    }

    /// Number of physical files registered so far (finalized plus current).
    pub fn file_count(&self) -> usize {
        self.metadata.relative_file_paths.len()
    }

    /// Fold an admitted message into the bag-level time bounds.
    ///
    /// Called for every message accepted by `write`, in every mode, before
    /// the message reaches a buffer or the backend.
    pub fn observe_admitted(&mut self, message: &SerializedMessage) {
        let ts = message.recv_timestamp;
        self.bag_min_time = Some(self.bag_min_time.map_or(ts, |t| t.min(ts)));
        self.bag_max_time = Some(self.bag_max_time.map_or(ts, |t| t.max(ts)));
    }

    /// Attribute one message to its topic and to the current file.
    ///
    /// Direct and cached modes attribute at admit time; snapshot mode defers
    /// to flush time so evicted messages are never counted.
    pub fn attribute_message(&mut self, message: &SerializedMessage) {
        match self.topics.get_mut(&message.topic_name) {
            Some(info) => info.message_count += 1,
            None => {
                warn!(topic = %message.topic_name, "Dropping count for unregistered topic");
                return;
            }
        }
        let ts = message.recv_timestamp;
        self.file_min_time = Some(self.file_min_time.map_or(ts, |t| t.min(ts)));
        self.file_max_time = Some(self.file_max_time.map_or(ts, |t| t.max(ts)));
    }

    /// Attribute a flushed snapshot batch to the current file.
    pub fn attribute_flushed_batch(&mut self, batch: &[Arc<SerializedMessage>]) {
        for message in batch {
            self.attribute_message(message);
        }
    }

    /// Finalize the statistics of the current file.
    ///
    /// The current file's count is the total attributed so far minus what
    /// previous files already account for; the bag size is the completed
    /// files' sizes plus `on_disk_size`. Pure recomputation: an aborted
    /// rotation may finalize the same file again later, after more messages
    /// were attributed to it, and gets up-to-date stats.
    pub fn finalize_current_file(&mut self, on_disk_size: u64) {
        let total: u64 = self.topics.values().map(|t| t.message_count).sum();
        if let Some(last) = self.metadata.files.last_mut() {
            last.message_count = total.saturating_sub(self.file_base_count);
            last.starting_time_ns = self.file_min_time;
            last.duration_ns = match (self.file_min_time, self.file_max_time) {
                (Some(min), Some(max)) => max.saturating_sub(min),
                _ => 0,
            };
        }
        self.current_file_size = on_disk_size;
        self.metadata.bag_size = self.completed_size + on_disk_size;
    }

    /// Register the next physical file and reset the per-file trackers.
    ///
    /// The previous file must have been finalized; its reported size moves
    /// into the completed total here.
    pub fn start_new_file(&mut self, relative_path: impl Into<String>) {
        let path = relative_path.into();
        self.metadata.relative_file_paths.push(path.clone());
        self.metadata.files.push(FileInfo::new(path));
        self.completed_size += self.current_file_size;
        self.current_file_size = 0;
        self.file_base_count = self.topics.values().map(|t| t.message_count).sum();
        self.file_min_time = None;
        self.file_max_time = None;
    }

    /// Produce the current externally persistable metadata.
    pub fn snapshot(&self) -> BagMetadata {
        let mut snapshot = self.metadata.clone();
        snapshot.starting_time_ns = self.bag_min_time;
        snapshot.duration_ns = match (self.bag_min_time, self.bag_max_time) {
            (Some(min), Some(max)) => max.saturating_sub(min),
            _ => 0,
        };
        snapshot.message_count = self.topics.values().map(|t| t.message_count).sum();
        snapshot.topics_with_message_count = self.topics.values().cloned().collect();
        snapshot
    }
}
