// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Core types used throughout robobag.
//!
//! This module provides the foundational types for the library:
//! - [`BagError`] - Comprehensive error handling for the recording pipeline
//! - [`Result`] - Crate-wide result alias

pub mod error;

pub use error::{BagError, Result};
