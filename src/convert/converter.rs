// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Per-message format conversion.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::convert::traits::{ConverterFactory, MessageDeserializer, MessageSerializer};
use crate::core::{BagError, Result};
use crate::types::SerializedMessage;

/// Input and output serialization formats for a recording session.
///
/// Equal formats (including both empty) mean messages pass through
/// unconverted and no plugin is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterOptions {
    /// Format messages arrive in
    pub input_format: String,
    /// Format messages are stored in
    pub output_format: String,
}

impl ConverterOptions {
    /// Create converter options for an input/output format pair.
    pub fn new(input_format: impl Into<String>, output_format: impl Into<String>) -> Self {
        Self {
            input_format: input_format.into(),
            output_format: output_format.into(),
        }
    }

    /// Whether these options require any conversion at all.
    pub fn needs_conversion(&self) -> bool {
        self.input_format != self.output_format
    }
}

/// A resolved deserializer/serializer pair applied to every message.
pub struct Converter {
    deserializer: Arc<dyn MessageDeserializer>,
    serializer: Arc<dyn MessageSerializer>,
}

impl Converter {
    /// Resolve both sides of the conversion through a factory.
    ///
    /// # Errors
    ///
    /// Returns `BagError::ConverterNotFound` naming the format and side that
    /// failed to resolve.
    pub fn new(factory: &dyn ConverterFactory, options: &ConverterOptions) -> Result<Self> {
        let deserializer = factory
            .load_deserializer(&options.input_format)
            .ok_or_else(|| {
                BagError::converter_not_found(options.input_format.clone(), "deserializer")
            })?;
        let serializer = factory
            .load_serializer(&options.output_format)
            .ok_or_else(|| {
                BagError::converter_not_found(options.output_format.clone(), "serializer")
            })?;

        Ok(Self {
            deserializer,
            serializer,
        })
    }

    /// Re-encode one message, preserving topic and timestamps.
    ///
    /// Exactly one deserialize and one serialize call per invocation.
    pub fn convert(&self, message: &SerializedMessage) -> Result<SerializedMessage> {
        let canonical = self.deserializer.deserialize(&message.payload)?;
        let payload = self.serializer.serialize(&canonical)?;

        Ok(SerializedMessage {
            topic_name: message.topic_name.clone(),
            payload,
            recv_timestamp: message.recv_timestamp,
            send_timestamp: message.send_timestamp,
        })
    }
}
