// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Converter registry for plugin-based format selection.
//!
//! This module provides a registry pattern for serialization format plugins,
//! allowing:
//! - Dynamic plugin registration
//! - Plugin-based extensibility
//! - Centralized plugin management

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::convert::traits::{ConverterFactory, MessageDeserializer, MessageSerializer};

/// Registry for serialization format plugins.
///
/// Deserializers and serializers register independently; a format may offer
/// only one side.
#[derive(Default)]
pub struct ConverterRegistry {
    // Use RwLock for thread-safe access
    deserializers: RwLock<HashMap<String, Arc<dyn MessageDeserializer>>>,
    serializers: RwLock<HashMap<String, Arc<dyn MessageSerializer>>>,
}

impl ConverterRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a deserializer for a format.
    pub fn register_deserializer(
        &self,
        format: impl Into<String>,
        deserializer: Arc<dyn MessageDeserializer>,
    ) {
        let mut deserializers = self.deserializers.write().unwrap();
        deserializers.insert(format.into(), deserializer);
    }

    /// Register a serializer for a format.
    pub fn register_serializer(
        &self,
        format: impl Into<String>,
        serializer: Arc<dyn MessageSerializer>,
    ) {
        let mut serializers = self.serializers.write().unwrap();
        serializers.insert(format.into(), serializer);
    }

    /// Unregister both sides of a format.
    ///
    /// # Returns
    ///
    /// `true` if either side was unregistered, `false` if not found
    pub fn unregister(&self, format: &str) -> bool {
        let removed_deserializer = self.deserializers.write().unwrap().remove(format).is_some();
        let removed_serializer = self.serializers.write().unwrap().remove(format).is_some();
        removed_deserializer || removed_serializer
    }

    /// Check if a deserializer is registered for a format.
    pub fn has_deserializer(&self, format: &str) -> bool {
        let deserializers = self.deserializers.read().unwrap();
        deserializers.contains_key(format)
    }

    /// Check if a serializer is registered for a format.
    pub fn has_serializer(&self, format: &str) -> bool {
        let serializers = self.serializers.read().unwrap();
        serializers.contains_key(format)
    }

    /// Get all formats with at least one registered side.
    ///
    /// # Returns
    ///
    /// A vector of format names
    pub fn registered_formats(&self) -> Vec<String> {
        let mut formats: Vec<String> = {
            let deserializers = self.deserializers.read().unwrap();
            deserializers.keys().cloned().collect()
        };
        {
            let serializers = self.serializers.read().unwrap();
            for format in serializers.keys() {
                if !formats.contains(format) {
                    formats.push(format.clone());
                }
            }
        }
        formats
    }
}

impl ConverterFactory for ConverterRegistry {
    fn load_deserializer(&self, format: &str) -> Option<Arc<dyn MessageDeserializer>> {
        let deserializers = self.deserializers.read().unwrap();
        deserializers.get(format).cloned()
    }

    fn load_serializer(&self, format: &str) -> Option<Arc<dyn MessageSerializer>> {
        let serializers = self.serializers.read().unwrap();
        serializers.get(format).cloned()
    }
}

/// Global converter registry.
///
/// This is a convenience singleton for accessing the global registry.
/// For custom registries, create a `ConverterRegistry` instance directly.
static GLOBAL_REGISTRY: std::sync::OnceLock<ConverterRegistry> = std::sync::OnceLock::new();

fn init_global_registry() -> ConverterRegistry {
    // Format plugins register themselves here as they are linked in
    ConverterRegistry::new()
}

/// Get the global converter registry.
pub fn global_registry() -> &'static ConverterRegistry {
    GLOBAL_REGISTRY.get_or_init(init_global_registry)
}

/// Default [`ConverterFactory`] dispatching through the global registry.
pub struct RegistryConverterFactory;

impl ConverterFactory for RegistryConverterFactory {
    fn load_deserializer(&self, format: &str) -> Option<Arc<dyn MessageDeserializer>> {
        global_registry().load_deserializer(format)
    }

    fn load_serializer(&self, format: &str) -> Option<Arc<dyn MessageSerializer>> {
        global_registry().load_serializer(format)
    }
}
