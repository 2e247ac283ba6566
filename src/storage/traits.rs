// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Traits abstracting over pluggable storage backends.

use std::path::PathBuf;
use std::sync::Arc;

use crate::core::Result;
use crate::meta::BagMetadata;
use crate::storage::options::StorageOptions;
use crate::types::SerializedMessage;

/// A single physical bag file bound read-write.
///
/// One instance per physical file; the writer opens a fresh backend for every
/// split. Implementations flush and release the file when dropped.
///
/// # Example
///
/// ```no_run
/// use robobag::storage::StorageBackend;
/// use robobag::types::SerializedMessage;
///
/// fn record<S: StorageBackend + ?Sized>(
///     storage: &mut S,
///     messages: &[SerializedMessage],
/// ) {
///     for msg in messages {
///         storage.write(msg).unwrap();
///     }
/// }
/// ```
pub trait StorageBackend: Send {
    /// Append a single message record.
    fn write(&mut self, message: &SerializedMessage) -> Result<()>;

    /// Append a batch of message records.
    ///
    /// Default implementation calls `write` for each message.
    /// Backends may override this to amortize framing or syscall costs.
    fn write_batch(&mut self, messages: &[Arc<SerializedMessage>]) -> Result<()> {
        for msg in messages {
            self.write(msg)?;
        }
        Ok(())
    }

    /// Current size of the file in bytes, including buffered data.
    fn get_bagfile_size(&self) -> u64;

    /// Smallest file size at which this backend can be split.
    ///
    /// A configured split threshold below this value is rejected at open.
    fn get_minimum_split_file_size(&self) -> u64;

    /// Path of the file this backend writes, relative to the working
    /// directory it was opened with.
    fn get_relative_file_path(&self) -> PathBuf;

    /// Identifier of the backend implementation, e.g. `"reclog"`.
    fn get_storage_identifier(&self) -> &str;

    /// Persist the given metadata snapshot into the file.
    ///
    /// Called when the file opens, before it closes, and around splits;
    /// later snapshots supersede earlier ones.
    fn update_metadata(&mut self, metadata: &BagMetadata) -> Result<()>;
}

/// Factory producing storage backends from options.
///
/// `options.uri` names the physical file to create, not the bag directory.
pub trait StorageFactory: Send + Sync {
    /// Open the file named by `options.uri` for writing, creating it.
    fn open_read_write(&self, options: &StorageOptions) -> Result<Box<dyn StorageBackend>>;
}
