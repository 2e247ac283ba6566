// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Traits for serialization format plugins.

use std::sync::Arc;

use crate::core::Result;

/// Decodes payloads from one serialization format into canonical bytes.
///
/// The canonical representation is an opaque byte string agreed on by the
/// deserializer/serializer pair; the pipeline never inspects it.
pub trait MessageDeserializer: Send + Sync {
    /// Decode one payload into canonical bytes.
    fn deserialize(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Encodes canonical bytes into payloads of one serialization format.
pub trait MessageSerializer: Send + Sync {
    /// Encode canonical bytes into one payload.
    fn serialize(&self, canonical: &[u8]) -> Result<Vec<u8>>;
}

/// Resolves serialization format names to converter plugins.
///
/// `None` signals that no plugin supports the format; the writer turns this
/// into a configuration error at open.
pub trait ConverterFactory: Send + Sync {
    /// Load the deserializer for a format, if one is available.
    fn load_deserializer(&self, format: &str) -> Option<Arc<dyn MessageDeserializer>>;

    /// Load the serializer for a format, if one is available.
    fn load_serializer(&self, format: &str) -> Option<Arc<dyn MessageSerializer>>;
}
