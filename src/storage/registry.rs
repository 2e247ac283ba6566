// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Storage registry for plugin-based backend selection.
//!
//! This module provides a registry pattern for storage backends, allowing:
//! - Dynamic backend registration
//! - Plugin-based extensibility
//! - Centralized backend management
//!
//! # Example
//!
//! ```no_run
//! use robobag::storage::{global_registry, StorageOptions};
//!
//! let options = StorageOptions::new("/tmp/session/session_0");
//! let storage = global_registry().open_read_write(&options).unwrap();
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use crate::core::{BagError, Result};
use crate::storage::options::StorageOptions;
use crate::storage::reclog::{RecLogFactory, RECLOG_STORAGE_ID};
use crate::storage::traits::{StorageBackend, StorageFactory};

/// Registry for storage backend factories.
///
/// This registry allows dynamic registration of backends and provides
/// a centralized way to open storage instances by identifier.
#[derive(Default)]
pub struct StorageRegistry {
    // Use RwLock for thread-safe access
    factories: RwLock<HashMap<String, Box<dyn StorageFactory>>>,
}

impl StorageRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a storage factory for an identifier.
    ///
    /// # Arguments
    ///
    /// * `storage_id` - Backend identifier (e.g., "reclog")
    /// * `factory` - Factory for opening storage instances
    ///
    /// # Example
    ///
    /// ```
    /// # use robobag::storage::{StorageRegistry, StorageFactory, StorageBackend, StorageOptions};
    /// # use robobag::core::Result;
    /// let registry = StorageRegistry::new();
    /// # struct MockFactory;
    /// # impl StorageFactory for MockFactory {
    /// #     fn open_read_write(&self, _options: &StorageOptions) -> Result<Box<dyn StorageBackend>> {
    /// #         unimplemented!()
    /// #     }
    /// # }
    /// registry.register("mock", Box::new(MockFactory));
    /// ```
    pub fn register(&self, storage_id: impl Into<String>, factory: Box<dyn StorageFactory>) {
        let mut factories = self.factories.write().unwrap();
        factories.insert(storage_id.into(), factory);
    }

    /// Unregister a storage factory.
    ///
    /// # Arguments
    ///
    /// * `storage_id` - Backend identifier to unregister
    ///
    /// # Returns
    ///
    /// `true` if a factory was unregistered, `false` if not found
    pub fn unregister(&self, storage_id: &str) -> bool {
        let mut factories = self.factories.write().unwrap();
        factories.remove(storage_id).is_some()
    }

    /// Check if a backend identifier is registered.
    ///
    /// # Arguments
    ///
    /// * `storage_id` - Backend identifier to check
    ///
    /// # Returns
    ///
    /// `true` if registered, `false` otherwise
    pub fn has_storage(&self, storage_id: &str) -> bool {
        let factories = self.factories.read().unwrap();
        factories.contains_key(storage_id)
    }

    /// Open a storage backend through the factory registered for
    /// `options.storage_id`.
    ///
    /// # Arguments
    ///
    /// * `options` - Storage options whose `uri` names one physical file
    ///
    /// # Returns
    ///
    /// An open backend, or error if the identifier is not registered
    ///
    /// # Errors
    ///
    /// Returns `BagError::UnknownStorageBackend` if `options.storage_id` is
    /// not registered; factory errors propagate unchanged.
    pub fn open_read_write(&self, options: &StorageOptions) -> Result<Box<dyn StorageBackend>> {
        let factories = self.factories.read().unwrap();
        factories
            .get(&options.storage_id)
            .ok_or_else(|| BagError::unknown_storage_backend(options.storage_id.clone()))?
            .open_read_write(options)
    }

    /// Get all registered backend identifiers.
    ///
    /// # Returns
    ///
    /// A vector of backend identifiers
    pub fn registered_storage_ids(&self) -> Vec<String> {
        let factories = self.factories.read().unwrap();
        factories.keys().cloned().collect()
    }

    /// Get the number of registered backends.
    pub fn count(&self) -> usize {
        let factories = self.factories.read().unwrap();
        factories.len()
    }
}

/// Global storage registry.
///
/// This is a convenience singleton for accessing the global registry.
/// For custom registries, create a `StorageRegistry` instance directly.
static GLOBAL_REGISTRY: std::sync::OnceLock<StorageRegistry> = std::sync::OnceLock::new();

fn init_global_registry() -> StorageRegistry {
    // Register built-in backends
    let registry = StorageRegistry::new();
    registry.register(RECLOG_STORAGE_ID, Box::new(RecLogFactory));
    registry
}

/// Get the global storage registry.
///
/// # Example
///
/// ```
/// # use robobag::storage::global_registry;
/// assert!(global_registry().has_storage("reclog"));
/// ```
pub fn global_registry() -> &'static StorageRegistry {
    GLOBAL_REGISTRY.get_or_init(init_global_registry)
}

/// Default [`StorageFactory`] dispatching through the global registry.
pub struct RegistryStorageFactory;

impl StorageFactory for RegistryStorageFactory {
    fn open_read_write(&self, options: &StorageOptions) -> Result<Box<dyn StorageBackend>> {
        global_registry().open_read_write(options)
    }
}
