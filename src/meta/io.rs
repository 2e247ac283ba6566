// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Reading and writing the bag-level metadata side file.
//!
//! The side file lives next to the physical storage files inside the bag
//! directory and is written exactly once, when the bag closes. The writer
//! talks to it through the [`MetadataIo`] trait so tests can intercept the
//! final metadata without touching the filesystem.

use std::fs;
use std::path::Path;

use crate::core::{BagError, Result};
use crate::meta::BagMetadata;

/// Name of the metadata side file inside the bag directory.
pub const METADATA_FILENAME: &str = "metadata.json";

/// Reads and writes bag-level metadata for a bag URI.
pub trait MetadataIo: Send {
    /// Write the metadata for the bag rooted at `uri`.
    fn write_metadata(&self, uri: &Path, metadata: &BagMetadata) -> Result<()>;

    /// Read the metadata for the bag rooted at `uri`.
    fn read_metadata(&self, uri: &Path) -> Result<BagMetadata>;

    /// Check whether a metadata file exists for the bag rooted at `uri`.
    fn metadata_file_exists(&self, uri: &Path) -> bool;
}

/// Default [`MetadataIo`] persisting metadata as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileMetadataIo;

impl FileMetadataIo {
    /// Create a new FileMetadataIo.
    pub fn new() -> Self {
        Self
    }

    fn metadata_path(uri: &Path) -> std::path::PathBuf {
        uri.join(METADATA_FILENAME)
    }
}

impl MetadataIo for FileMetadataIo {
    fn write_metadata(&self, uri: &Path, metadata: &BagMetadata) -> Result<()> {
        let serialized = serde_json::to_string_pretty(metadata)
            .map_err(|e| BagError::metadata("serialize", e.to_string()))?;
        fs::write(Self::metadata_path(uri), serialized).map_err(|e| {
            BagError::metadata(
                "write",
                format!("failed to write {}: {e}", METADATA_FILENAME),
            )
        })
    }

    fn read_metadata(&self, uri: &Path) -> Result<BagMetadata> {
        let contents = fs::read_to_string(Self::metadata_path(uri)).map_err(|e| {
            BagError::metadata(
                "read",
                format!("failed to read {}: {e}", METADATA_FILENAME),
            )
        })?;
        serde_json::from_str(&contents).map_err(|e| BagError::metadata("parse", e.to_string()))
    }

    fn metadata_file_exists(&self, uri: &Path) -> bool {
        Self::metadata_path(uri).is_file()
    }
}
