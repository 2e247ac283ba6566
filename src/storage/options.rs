// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Storage configuration for a recording session.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::reclog::RECLOG_STORAGE_ID;

/// Options controlling where and how a bag is recorded.
///
/// `uri` names the bag directory; physical files are created inside it and
/// named after its final path component. When the writer opens an individual
/// file it hands the factory a copy of these options with `uri` rewritten to
/// that file's path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageOptions {
    /// Bag directory (or, when handed to a factory, one physical file)
    pub uri: PathBuf,
    /// Storage backend selector
    pub storage_id: String,
    /// Split threshold in bytes; 0 disables size-based splitting
    pub max_bagfile_size: u64,
    /// Cache budget in bytes; 0 disables caching
    pub max_cache_size: u64,
    /// Record into a bounded in-memory buffer, flushed only on demand
    pub snapshot_mode: bool,
    /// Compression format recorded in the metadata (pass-through)
    pub compression_format: String,
    /// Compression mode recorded in the metadata (pass-through)
    pub compression_mode: String,
}

impl StorageOptions {
    /// Create options for a bag directory with the default backend.
    pub fn new(uri: impl Into<PathBuf>) -> Self {
        Self {
            uri: uri.into(),
            storage_id: RECLOG_STORAGE_ID.to_string(),
            max_bagfile_size: 0,
            max_cache_size: 0,
            snapshot_mode: false,
            compression_format: String::new(),
            compression_mode: String::new(),
        }
    }

    /// Set the storage backend selector.
    pub fn with_storage_id(mut self, storage_id: impl Into<String>) -> Self {
        self.storage_id = storage_id.into();
        self
    }

    /// Set the split threshold in bytes (0 disables splitting).
    pub fn with_max_bagfile_size(mut self, bytes: u64) -> Self {
        self.max_bagfile_size = bytes;
        self
    }

    /// Set the cache budget in bytes (0 disables caching).
    pub fn with_max_cache_size(mut self, bytes: u64) -> Self {
        self.max_cache_size = bytes;
        self
    }

    /// Enable or disable snapshot mode.
    pub fn with_snapshot_mode(mut self, snapshot_mode: bool) -> Self {
        self.snapshot_mode = snapshot_mode;
        self
    }

    /// Set the compression fields recorded in the metadata.
    pub fn with_compression(
        mut self,
        format: impl Into<String>,
        mode: impl Into<String>,
    ) -> Self {
        self.compression_format = format.into();
        self.compression_mode = mode.into();
        self
    }

    /// Copy of these options pointing at a single physical file.
    pub fn for_file(&self, file_uri: impl AsRef<Path>) -> Self {
        let mut options = self.clone();
        options.uri = file_uri.as_ref().to_path_buf();
        options
    }
}
