// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Core error types for robobag.
//!
//! Provides error types for the recording pipeline:
//! - Configuration validation at open
//! - Topic routing
//! - Writer lifecycle misuse
//! - Storage and metadata I/O

/// Errors that can occur during bag recording operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BagError {
    /// Requested max bagfile size is below the backend minimum
    #[error("Invalid bag splitting size: specified {specified} bytes, but the backend requires at least {minimum} bytes")]
    InvalidSplitSize {
        /// Value requested in the storage options
        specified: u64,
        /// Minimum the backend can split at
        minimum: u64,
    },

    /// Snapshot mode enabled without a cache budget
    #[error("Snapshot mode requires a nonzero max cache size")]
    InvalidSnapshotConfig,

    /// No converter plugin registered for a serialization format
    #[error("No {role} registered for serialization format '{format}'")]
    ConverterNotFound {
        /// Serialization format that failed to resolve
        format: String,
        /// Which side was requested ("serializer" or "deserializer")
        role: String,
    },

    /// No storage backend registered under the given identifier
    #[error("No storage backend registered under '{storage_id}'")]
    UnknownStorageBackend {
        /// Identifier from the storage options
        storage_id: String,
    },

    /// Message references a topic that was never created
    #[error("Topic '{topic}' has not been created yet")]
    UnknownTopic {
        /// Topic name carried by the message
        topic: String,
    },

    /// Topic re-registered with conflicting metadata
    #[error("Topic '{topic}' is already registered with different metadata")]
    TopicAlreadyRegistered {
        /// Topic name
        topic: String,
    },

    /// Writer opened while already open
    #[error("Writer is already open")]
    AlreadyOpen,

    /// Operation requires an open writer
    #[error("Bag is not open. Call open() before {operation}")]
    NotOpen {
        /// Operation that was attempted
        operation: String,
    },

    /// Storage backend failure
    #[error("Storage error during {context}: {message}")]
    Storage {
        /// What was being done (e.g., "write", "open", "size query")
        context: String,
        /// Error message
        message: String,
    },

    /// Metadata serialization or persistence failure
    #[error("Metadata error during {context}: {message}")]
    Metadata {
        /// What was being done
        context: String,
        /// Error message
        message: String,
    },

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

impl BagError {
    /// Create an invalid split size error.
    pub fn invalid_split_size(specified: u64, minimum: u64) -> Self {
        BagError::InvalidSplitSize { specified, minimum }
    }

    /// Create a converter resolution error.
    pub fn converter_not_found(format: impl Into<String>, role: impl Into<String>) -> Self {
        BagError::ConverterNotFound {
            format: format.into(),
            role: role.into(),
        }
    }

    /// Create an unknown storage backend error.
    pub fn unknown_storage_backend(storage_id: impl Into<String>) -> Self {
        BagError::UnknownStorageBackend {
            storage_id: storage_id.into(),
        }
    }

    /// Create an unknown topic error.
    pub fn unknown_topic(topic: impl Into<String>) -> Self {
        BagError::UnknownTopic {
            topic: topic.into(),
        }
    }

    /// Create a conflicting topic registration error.
    pub fn topic_already_registered(topic: impl Into<String>) -> Self {
        BagError::TopicAlreadyRegistered {
            topic: topic.into(),
        }
    }

    /// Create a "writer not open" error.
    pub fn not_open(operation: impl Into<String>) -> Self {
        BagError::NotOpen {
            operation: operation.into(),
        }
    }

    /// Create a storage backend error.
    pub fn storage(context: impl Into<String>, message: impl Into<String>) -> Self {
        BagError::Storage {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a metadata error.
    pub fn metadata(context: impl Into<String>, message: impl Into<String>) -> Self {
        BagError::Metadata {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Get structured fields for logging.
    pub fn log_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            BagError::InvalidSplitSize { specified, minimum } => vec![
                ("specified", specified.to_string()),
                ("minimum", minimum.to_string()),
            ],
            BagError::InvalidSnapshotConfig => vec![],
            BagError::ConverterNotFound { format, role } => {
                vec![("format", format.clone()), ("role", role.clone())]
            }
            BagError::UnknownStorageBackend { storage_id } => {
                vec![("storage_id", storage_id.clone())]
            }
            BagError::UnknownTopic { topic } => vec![("topic", topic.clone())],
            BagError::TopicAlreadyRegistered { topic } => vec![("topic", topic.clone())],
            BagError::AlreadyOpen => vec![],
            BagError::NotOpen { operation } => vec![("operation", operation.clone())],
            BagError::Storage { context, message } => {
                vec![("context", context.clone()), ("message", message.clone())]
            }
            BagError::Metadata { context, message } => {
                vec![("context", context.clone()), ("message", message.clone())]
            }
            BagError::Other(msg) => vec![("message", msg.clone())],
        }
    }
}

impl From<std::io::Error> for BagError {
    fn from(err: std::io::Error) -> Self {
        BagError::Storage {
            context: "io".to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type for robobag operations.
pub type Result<T> = std::result::Result<T, BagError>;
