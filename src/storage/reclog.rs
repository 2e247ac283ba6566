// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Built-in append-only record-log storage backend.
//!
//! This module provides the reference [`StorageBackend`] registered under
//! `"reclog"`.
//!
//! # RecLog Format Overview
//!
//! A reclog file has the following structure:
//! 1. Magic: `RECLOG` + 0x00 + format version byte (8 bytes)
//! 2. Records, each framed as:
//!    - kind (u8)
//!    - body length (u32, little-endian)
//!    - body bytes
//!    - CRC32 of the body (u32, little-endian)
//!
//! Record kinds:
//! - Topic record: interned topic ID + topic name. Written lazily the first
//!   time a topic appears in this file.
//! - Message record: topic ID, receive/send timestamps, payload.
//! - Metadata record: the bag metadata as JSON. Written on every
//!   `update_metadata` call; readers take the last one.
//!
//! # Example
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use robobag::storage::{RecLogStorage, StorageBackend, StorageOptions};
//! use robobag::types::SerializedMessage;
//!
//! let options = StorageOptions::new("/tmp/session/session_0");
//! let mut storage = RecLogStorage::create(&options)?;
//!
//! let msg = SerializedMessage::new("/chatter", vec![1, 2, 3]).with_timestamp(1000);
//! storage.write(&msg)?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::warn;

use crate::core::{BagError, Result};
use crate::meta::BagMetadata;
use crate::storage::options::StorageOptions;
use crate::storage::traits::{StorageBackend, StorageFactory};
use crate::types::SerializedMessage;

/// Identifier this backend is registered under.
pub const RECLOG_STORAGE_ID: &str = "reclog";

/// File magic: "RECLOG", a NUL separator, and the format version.
const RECLOG_MAGIC: [u8; 8] = *b"RECLOG\0\x01";

/// Record kinds
const RECORD_TOPIC: u8 = 0x01;
const RECORD_MESSAGE: u8 = 0x02;
const RECORD_METADATA: u8 = 0x03;

/// Per-record framing overhead: kind (1) + body length (4) + CRC32 (4).
const RECORD_OVERHEAD: u64 = 9;

/// Smallest file size this backend accepts as a split threshold.
///
/// Below this, a file would rotate before holding any useful payload.
const MIN_SPLIT_SIZE: u64 = 4096;

/// Append-only record-log storage for one physical bag file.
///
/// Dropping the storage flushes buffered records; a flush failure at that
/// point is logged rather than returned.
pub struct RecLogStorage {
    /// Buffered file writer
    writer: BufWriter<File>,
    /// Path this file was opened with
    path: PathBuf,
    /// Interned topic IDs for this file
    topic_ids: HashMap<String, u16>,
    /// Next topic ID to assign
    next_topic_id: u16,
    /// Logical file size, including bytes still in the write buffer
    current_position: u64,
}

impl RecLogStorage {
    /// Create a new reclog file at `options.uri`.
    ///
    /// Missing parent directories are created.
    pub fn create(options: &StorageOptions) -> Result<Self> {
        let path = options.uri.clone();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BagError::storage(
                    "open",
                    format!("Failed to create directory {}: {e}", parent.display()),
                )
            })?;
        }

        let file = File::create(&path).map_err(|e| {
            BagError::storage("open", format!("Failed to create {}: {e}", path.display()))
        })?;

        let mut writer = BufWriter::new(file);
        writer.write_all(&RECLOG_MAGIC).map_err(|e| {
            BagError::storage("open", format!("Failed to write file header: {e}"))
        })?;

        Ok(Self {
            writer,
            path,
            topic_ids: HashMap::new(),
            next_topic_id: 0,
            current_position: RECLOG_MAGIC.len() as u64,
        })
    }

    /// Append one framed record.
    fn write_record(&mut self, kind: u8, body: &[u8]) -> Result<()> {
        self.writer.write_u8(kind)?;
        self.writer.write_u32::<LittleEndian>(body.len() as u32)?;
        self.writer.write_all(body)?;
        self.writer.write_u32::<LittleEndian>(crc32fast::hash(body))?;
        self.current_position += RECORD_OVERHEAD + body.len() as u64;
        Ok(())
    }

    /// Intern a topic name, writing its topic record on first use.
    fn intern_topic(&mut self, name: &str) -> Result<u16> {
        if let Some(&id) = self.topic_ids.get(name) {
            return Ok(id);
        }

        let id = self.next_topic_id;
        self.next_topic_id = id.wrapping_add(1);

        let body = encode_topic_body(id, name);
        self.write_record(RECORD_TOPIC, &body)?;
        self.topic_ids.insert(name.to_string(), id);

        Ok(id)
    }
}

impl StorageBackend for RecLogStorage {
    fn write(&mut self, message: &SerializedMessage) -> Result<()> {
        let topic_id = self.intern_topic(&message.topic_name)?;
        let body = encode_message_body(topic_id, message);
        self.write_record(RECORD_MESSAGE, &body)
    }

    fn get_bagfile_size(&self) -> u64 {
        self.current_position
    }

    fn get_minimum_split_file_size(&self) -> u64 {
        MIN_SPLIT_SIZE
    }

    fn get_relative_file_path(&self) -> PathBuf {
        self.path.clone()
    }

    fn get_storage_identifier(&self) -> &str {
        RECLOG_STORAGE_ID
    }

    fn update_metadata(&mut self, metadata: &BagMetadata) -> Result<()> {
        let body = serde_json::to_vec(metadata)
            .map_err(|e| BagError::metadata("serialize", e.to_string()))?;
        self.write_record(RECORD_METADATA, &body)?;
        // Metadata records mark durability points, so push them to disk
        self.writer
            .flush()
            .map_err(|e| BagError::storage("flush", e.to_string()))?;
        Ok(())
    }
}

impl Drop for RecLogStorage {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!(path = %self.path.display(), error = %e, "Failed to flush reclog file on close");
        }
    }
}

/// Factory for [`RecLogStorage`].
pub struct RecLogFactory;

impl StorageFactory for RecLogFactory {
    fn open_read_write(&self, options: &StorageOptions) -> Result<Box<dyn StorageBackend>> {
        Ok(Box::new(RecLogStorage::create(options)?))
    }
}

/// Summary of a reclog file produced by [`scan_file`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecLogSummary {
    /// Topic names in interning order
    pub topics: Vec<String>,
    /// Number of message records
    pub message_count: u64,
    /// Last metadata record in the file, if any
    pub metadata: Option<BagMetadata>,
}

/// Walk every record in a reclog file, verifying framing and checksums.
///
/// Returns the interned topics, the message count, and the last metadata
/// record. Fails on a bad magic, a checksum mismatch, an unknown record
/// kind, or a truncated record.
pub fn scan_file(path: &Path) -> Result<RecLogSummary> {
    let file = File::open(path).map_err(|e| {
        BagError::storage("scan", format!("Failed to open {}: {e}", path.display()))
    })?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 8];
    reader
        .read_exact(&mut magic)
        .map_err(|e| BagError::storage("scan", format!("Failed to read file header: {e}")))?;
    if magic != RECLOG_MAGIC {
        return Err(BagError::storage("scan", "Not a reclog file"));
    }

    let mut summary = RecLogSummary {
        topics: Vec::new(),
        message_count: 0,
        metadata: None,
    };
    let mut offset = RECLOG_MAGIC.len() as u64;

    loop {
        let kind = match reader.read_u8() {
            Ok(kind) => kind,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(BagError::storage("scan", e.to_string())),
        };

        let body_len = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| truncated_record(offset, e))?;
        let mut body = vec![0u8; body_len as usize];
        reader
            .read_exact(&mut body)
            .map_err(|e| truncated_record(offset, e))?;
        let stored_crc = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| truncated_record(offset, e))?;

        if crc32fast::hash(&body) != stored_crc {
            return Err(BagError::storage(
                "scan",
                format!("Checksum mismatch in record at offset {offset}"),
            ));
        }

        match kind {
            RECORD_TOPIC => {
                let name = decode_topic_body(&body, offset)?;
                summary.topics.push(name);
            }
            RECORD_MESSAGE => summary.message_count += 1,
            RECORD_METADATA => {
                let metadata = serde_json::from_slice(&body)
                    .map_err(|e| BagError::metadata("parse", e.to_string()))?;
                summary.metadata = Some(metadata);
            }
            other => {
                return Err(BagError::storage(
                    "scan",
                    format!("Unknown record kind 0x{other:02x} at offset {offset}"),
                ));
            }
        }

        offset += RECORD_OVERHEAD + body_len as u64;
    }

    Ok(summary)
}

// =============================================================================
// Record body encoding
// =============================================================================

/// Encode a topic record body: ID + length-prefixed name.
fn encode_topic_body(id: u16, name: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(2 + 4 + name.len());
    body.extend_from_slice(&id.to_le_bytes());
    body.extend_from_slice(&(name.len() as u32).to_le_bytes());
    body.extend_from_slice(name.as_bytes());
    body
}

/// Decode a topic record body back to the topic name.
fn decode_topic_body(body: &[u8], offset: u64) -> Result<String> {
    if body.len() < 6 {
        return Err(BagError::storage(
            "scan",
            format!("Truncated topic record at offset {offset}"),
        ));
    }
    let name_len = u32::from_le_bytes([body[2], body[3], body[4], body[5]]) as usize;
    if body.len() < 6 + name_len {
        return Err(BagError::storage(
            "scan",
            format!("Truncated topic record at offset {offset}"),
        ));
    }
    String::from_utf8(body[6..6 + name_len].to_vec())
        .map_err(|e| BagError::storage("scan", format!("Invalid topic name: {e}")))
}

/// Encode a message record body: topic ID, timestamps, length-prefixed payload.
fn encode_message_body(topic_id: u16, message: &SerializedMessage) -> Vec<u8> {
    let mut body = Vec::with_capacity(2 + 8 + 8 + 4 + message.payload.len());
    body.extend_from_slice(&topic_id.to_le_bytes());
    body.extend_from_slice(&message.recv_timestamp.to_le_bytes());
    body.extend_from_slice(&message.send_timestamp.to_le_bytes());
    body.extend_from_slice(&(message.payload.len() as u32).to_le_bytes());
    body.extend_from_slice(&message.payload);
    body
}

fn truncated_record(offset: u64, err: std::io::Error) -> BagError {
    BagError::storage(
        "scan",
        format!("Truncated record at offset {offset}: {err}"),
    )
}
