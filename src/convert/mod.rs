// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! On-the-fly serialization format conversion.
//!
//! This module provides the plugin surface for re-encoding messages between
//! serialization formats as they are recorded:
//! - [`traits`] - Plugin traits and the factory abstraction
//! - [`registry`] - Registry for plugin-based format selection
//! - [`converter`] - The per-session deserializer/serializer pair

pub mod converter;
pub mod registry;
pub mod traits;

pub use converter::{Converter, ConverterOptions};
pub use registry::{global_registry, ConverterRegistry, RegistryConverterFactory};
pub use traits::{ConverterFactory, MessageDeserializer, MessageSerializer};
