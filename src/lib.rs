// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! # Robobag
//!
//! Recording library for robotics message logs ("bags").
//!
//! A bag is a directory of numbered storage files plus a `metadata.json`
//! side file describing the whole session. This library provides the write
//! path: a sequential writer with file rotation, write-behind caching,
//! snapshot recording, and pluggable storage and serialization formats.
//!
//! ## Architecture
//!
//! The library is organized by pipeline stage:
//! - `writer/` - The sequential writer driving a recording session
//! - `storage/` - Storage backend trait, registry, and the reclog format
//! - `cache/` - Bounded buffers and the background consumer
//! - `convert/` - Serialization format conversion plugins
//! - `meta/` - Metadata aggregation and the `metadata.json` side file
//! - `types/` - Messages and topic descriptions
//! - `core/` - Errors and shared aliases
//!
//! ## Example: Recording a bag
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use robobag::convert::ConverterOptions;
//! use robobag::types::{SerializedMessage, TopicMetadata};
//! use robobag::{SequentialWriter, StorageOptions};
//!
//! let mut writer = SequentialWriter::new();
//! writer.open(
//!     StorageOptions::new("/data/run").with_max_bagfile_size(512 * 1024 * 1024),
//!     ConverterOptions::default(),
//! )?;
//! writer.create_topic(&TopicMetadata::new(0, "/imu", "sensor_msgs/msg/Imu"))?;
//! writer.write(Arc::new(
//!     SerializedMessage::new("/imu", vec![0; 64]).with_timestamp(1_000_000),
//! ))?;
//! writer.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Example: Snapshot recording
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use robobag::convert::ConverterOptions;
//! use robobag::{SequentialWriter, StorageOptions};
//!
//! let mut writer = SequentialWriter::new();
//! writer.open(
//!     StorageOptions::new("/data/incident")
//!         .with_max_cache_size(64 * 1024 * 1024)
//!         .with_snapshot_mode(true),
//!     ConverterOptions::default(),
//! )?;
//! // ... messages accumulate in a bounded in-memory buffer ...
//! writer.take_snapshot()?; // flush the newest messages to disk and rotate
//! writer.close()?;
//! # Ok(())
//! # }
//! ```

// Core types
pub mod core;

// Re-export core types for convenience
pub use core::{BagError, Result};

// Messages and topic descriptions
pub mod types;

// Metadata aggregation and the side file
pub mod meta;

// Storage backends and the registry
pub mod storage;

// Serialization format conversion
pub mod convert;

// Write-behind and snapshot caching
pub mod cache;

// The sequential writer
pub mod writer;

// Re-export the recording surface
pub use meta::{BagMetadata, FileInfo};
pub use storage::StorageOptions;
pub use types::{SerializedMessage, TopicInformation, TopicMetadata};
pub use writer::{BagSplitInfo, SequentialWriter, WriterEventCallbacks};
