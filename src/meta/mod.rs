// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Bag-level metadata: per-file records, aggregate statistics, and the
//! side-file reader/writer.
//!
//! [`BagMetadata`] is the externally persisted view of a recording session.
//! It is pushed to the storage backend at open, around every split, and at
//! close, and written once to the metadata side file when the bag closes.

pub mod aggregator;
pub mod io;

pub use aggregator::MetadataAggregator;
pub use io::{FileMetadataIo, MetadataIo, METADATA_FILENAME};

use serde::{Deserialize, Serialize};

use crate::types::TopicInformation;

/// Version of the metadata layout written to the side file.
pub const METADATA_VERSION: u32 = 1;

/// Statistics for one physical file of a bag.
///
/// Appended in creation order; never mutated after the next file opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// File name relative to the bag directory
    pub path: String,
    /// Timestamp of the oldest message in the file (None while empty)
    pub starting_time_ns: Option<u64>,
    /// Newest minus oldest message timestamp
    pub duration_ns: u64,
    /// Messages persisted into this file
    pub message_count: u64,
}

impl FileInfo {
    /// Create an empty FileInfo for a freshly opened file.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            starting_time_ns: None,
            duration_ns: 0,
            message_count: 0,
        }
    }
}

/// Aggregate metadata for a whole recording session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagMetadata {
    /// Metadata layout version
    pub version: u32,
    /// Identifier of the storage backend that produced the files
    pub storage_identifier: String,
    /// File names relative to the bag directory, parallel to `files`
    pub relative_file_paths: Vec<String>,
    /// Per-file statistics in creation order
    pub files: Vec<FileInfo>,
    /// Timestamp of the earliest admitted message (None before the first)
    pub starting_time_ns: Option<u64>,
    /// Latest admitted message timestamp minus the earliest
    pub duration_ns: u64,
    /// Total messages across all files
    pub message_count: u64,
    /// Registered topics with their message counts
    pub topics_with_message_count: Vec<TopicInformation>,
    /// Compression format carried from the storage options
    pub compression_format: String,
    /// Compression mode carried from the storage options
    pub compression_mode: String,
    /// Summed on-disk size of all finalized files in bytes
    pub bag_size: u64,
}

impl BagMetadata {
    /// Create empty metadata for a new bag.
    pub fn new(storage_identifier: impl Into<String>) -> Self {
        Self {
            version: METADATA_VERSION,
            storage_identifier: storage_identifier.into(),
            relative_file_paths: Vec::new(),
            files: Vec::new(),
            starting_time_ns: None,
            duration_ns: 0,
            message_count: 0,
            topics_with_message_count: Vec::new(),
            compression_format: String::new(),
            compression_mode: String::new(),
            bag_size: 0,
        }
    }
}

impl Default for BagMetadata {
    fn default() -> Self {
        Self::new("")
    }
}
