// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Pluggable storage layer for bag files.
//!
//! This module provides the foundational types and traits for persisting
//! recorded messages:
//! - [`options`] - Storage configuration
//! - [`traits`] - Backend and factory abstractions
//! - [`registry`] - Registry for plugin-based backend selection
//! - [`reclog`] - Built-in append-only record-log backend

pub mod options;
pub mod registry;
pub mod reclog;
pub mod traits;

pub use options::StorageOptions;
pub use reclog::{scan_file, RecLogFactory, RecLogStorage, RecLogSummary, RECLOG_STORAGE_ID};
pub use registry::{global_registry, RegistryStorageFactory, StorageRegistry};
pub use traits::{StorageBackend, StorageFactory};
