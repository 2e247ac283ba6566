// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Sequential writer tests against mock storage.
//!
//! Tests cover:
//! - Metadata persistence at open and close
//! - Direct, cached, and size-split recording
//! - File naming across rotations
//! - Topic registration rules
//! - Format conversion wiring
//! - Split callbacks
//! - Deferred consumer errors
//! - Lifecycle misuse

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use robobag::convert::{
    ConverterFactory, ConverterOptions, MessageDeserializer, MessageSerializer,
};
use robobag::meta::{BagMetadata, MetadataIo};
use robobag::storage::{StorageBackend, StorageFactory, StorageOptions};
use robobag::types::{SerializedMessage, TopicMetadata};
use robobag::writer::{BagSplitInfo, SequentialWriter, WriterEventCallbacks};
use robobag::{BagError, Result};

// ============================================================================
// Test Fixtures
// ============================================================================

/// Cleanup guard for test temporary directories.
struct CleanupGuard(PathBuf);

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

/// Unique bag directory for one test. The writer creates it on open.
fn temp_bag_dir(name: &str) -> (PathBuf, CleanupGuard) {
    let random = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "robobag_writer_test_{}_{}_{}",
        name,
        std::process::id(),
        random
    ));
    let guard = CleanupGuard(dir.clone());
    (dir, guard)
}

fn stem(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn chatter_topic() -> TopicMetadata {
    TopicMetadata::new(0, "/chatter", "std_msgs/msg/String").with_serialization_format("cdr")
}

fn msg(ts: u64) -> Arc<SerializedMessage> {
    Arc::new(SerializedMessage::new("/chatter", vec![0u8; 10]).with_timestamp(ts))
}

// ============================================================================
// Mock storage
// ============================================================================

/// Everything the mock backends observed, shared across rotations.
#[derive(Default)]
struct RecorderLog {
    /// (file name, recv timestamp) per single-message write
    single_writes: Vec<(String, u64)>,
    /// (file name, recv timestamps) per batched write
    batches: Vec<(String, Vec<u64>)>,
    /// Payloads in the order the backend received them
    payloads: Vec<Vec<u8>>,
    /// (file name, snapshot) per backend `update_metadata` call
    metadata_updates: Vec<(String, BagMetadata)>,
    /// File names in the order the factory opened them
    opened_files: Vec<String>,
}

impl RecorderLog {
    fn batched_total(&self) -> usize {
        self.batches.iter().map(|(_, ts)| ts.len()).sum()
    }

    fn batched_timestamps(&self) -> Vec<u64> {
        self.batches
            .iter()
            .flat_map(|(_, ts)| ts.iter().copied())
            .collect()
    }

    fn files_len_sequence(&self) -> Vec<usize> {
        self.metadata_updates
            .iter()
            .map(|(_, m)| m.files.len())
            .collect()
    }

    fn update_stems(&self) -> Vec<String> {
        self.metadata_updates
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

struct MockStorage {
    file_name: String,
    path: PathBuf,
    log: Arc<Mutex<RecorderLog>>,
    written: u64,
    minimum_split_size: u64,
    fail_batches: bool,
    fail_writes: bool,
    /// Remaining `update_metadata` calls to fail, shared across rotations
    metadata_failures: Arc<AtomicUsize>,
}

impl StorageBackend for MockStorage {
    fn write(&mut self, message: &SerializedMessage) -> Result<()> {
        if self.fail_writes {
            return Err(BagError::storage("write", "injected write failure"));
        }
        self.written += 1;
        let mut log = self.log.lock().unwrap();
        log.single_writes
            .push((self.file_name.clone(), message.recv_timestamp));
        log.payloads.push(message.payload.clone());
        Ok(())
    }

    fn write_batch(&mut self, messages: &[Arc<SerializedMessage>]) -> Result<()> {
        if self.fail_batches {
            return Err(BagError::storage("write_batch", "injected batch failure"));
        }
        self.written += messages.len() as u64;
        let mut log = self.log.lock().unwrap();
        log.batches.push((
            self.file_name.clone(),
            messages.iter().map(|m| m.recv_timestamp).collect(),
        ));
        for message in messages {
            log.payloads.push(message.payload.clone());
        }
        Ok(())
    }

    fn get_bagfile_size(&self) -> u64 {
        // One message counts as one byte of "size", so split thresholds in
        // these tests are message counts.
        self.written
    }

    fn get_minimum_split_file_size(&self) -> u64 {
        self.minimum_split_size
    }

    fn get_relative_file_path(&self) -> PathBuf {
        self.path.clone()
    }

    fn get_storage_identifier(&self) -> &str {
        "mock"
    }

    fn update_metadata(&mut self, metadata: &BagMetadata) -> Result<()> {
        if self.metadata_failures.load(Ordering::SeqCst) > 0 {
            self.metadata_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(BagError::storage(
                "update_metadata",
                "injected metadata failure",
            ));
        }
        self.log
            .lock()
            .unwrap()
            .metadata_updates
            .push((self.file_name.clone(), metadata.clone()));
        Ok(())
    }
}

#[derive(Default)]
struct MockStorageFactory {
    log: Arc<Mutex<RecorderLog>>,
    minimum_split_size: u64,
    fail_batches: bool,
    fail_writes: bool,
    metadata_failures: Arc<AtomicUsize>,
}

impl MockStorageFactory {
    fn new(log: Arc<Mutex<RecorderLog>>) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    fn with_minimum_split_size(mut self, bytes: u64) -> Self {
        self.minimum_split_size = bytes;
        self
    }

    fn failing_batches(mut self) -> Self {
        self.fail_batches = true;
        self
    }

    fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }
}

impl StorageFactory for MockStorageFactory {
    fn open_read_write(&self, options: &StorageOptions) -> Result<Box<dyn StorageBackend>> {
        let file_name = stem(&options.uri);
        self.log.lock().unwrap().opened_files.push(file_name.clone());
        Ok(Box::new(MockStorage {
            file_name,
            path: options.uri.clone(),
            log: Arc::clone(&self.log),
            written: 0,
            minimum_split_size: self.minimum_split_size,
            fail_batches: self.fail_batches,
            fail_writes: self.fail_writes,
            metadata_failures: Arc::clone(&self.metadata_failures),
        }))
    }
}

// ============================================================================
// Mock metadata IO and converters
// ============================================================================

#[derive(Default)]
struct MetadataSink {
    written: Vec<(PathBuf, BagMetadata)>,
}

struct MockMetadataIo {
    sink: Arc<Mutex<MetadataSink>>,
}

impl MetadataIo for MockMetadataIo {
    fn write_metadata(&self, uri: &Path, metadata: &BagMetadata) -> Result<()> {
        self.sink
            .lock()
            .unwrap()
            .written
            .push((uri.to_path_buf(), metadata.clone()));
        Ok(())
    }

    fn read_metadata(&self, _uri: &Path) -> Result<BagMetadata> {
        self.sink
            .lock()
            .unwrap()
            .written
            .last()
            .map(|(_, m)| m.clone())
            .ok_or_else(|| BagError::metadata("read", "nothing written"))
    }

    fn metadata_file_exists(&self, _uri: &Path) -> bool {
        !self.sink.lock().unwrap().written.is_empty()
    }
}

/// Deserializer tagging the canonical bytes so conversion is observable.
struct TaggingDeserializer {
    calls: Arc<AtomicUsize>,
}

impl MessageDeserializer for TaggingDeserializer {
    fn deserialize(&self, payload: &[u8]) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut canonical = payload.to_vec();
        canonical.push(0xD0);
        Ok(canonical)
    }
}

struct TaggingSerializer {
    calls: Arc<AtomicUsize>,
}

impl MessageSerializer for TaggingSerializer {
    fn serialize(&self, canonical: &[u8]) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut payload = canonical.to_vec();
        payload.push(0x5E);
        Ok(payload)
    }
}

/// Converter factory with configurable known formats and call counters.
#[derive(Default)]
struct MockConverterFactory {
    known_deserializer: String,
    known_serializer: String,
    deserialize_calls: Arc<AtomicUsize>,
    serialize_calls: Arc<AtomicUsize>,
    consults: Arc<AtomicUsize>,
}

impl ConverterFactory for MockConverterFactory {
    fn load_deserializer(&self, format: &str) -> Option<Arc<dyn MessageDeserializer>> {
        self.consults.fetch_add(1, Ordering::SeqCst);
        (format == self.known_deserializer).then(|| {
            Arc::new(TaggingDeserializer {
                calls: Arc::clone(&self.deserialize_calls),
            }) as Arc<dyn MessageDeserializer>
        })
    }

    fn load_serializer(&self, format: &str) -> Option<Arc<dyn MessageSerializer>> {
        self.consults.fetch_add(1, Ordering::SeqCst);
        (format == self.known_serializer).then(|| {
            Arc::new(TaggingSerializer {
                calls: Arc::clone(&self.serialize_calls),
            }) as Arc<dyn MessageSerializer>
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

fn mock_writer() -> (
    SequentialWriter,
    Arc<Mutex<RecorderLog>>,
    Arc<Mutex<MetadataSink>>,
) {
    let log = Arc::new(Mutex::new(RecorderLog::default()));
    let sink = Arc::new(Mutex::new(MetadataSink::default()));
    let writer = writer_with(MockStorageFactory::new(Arc::clone(&log)), &sink);
    (writer, log, sink)
}

fn writer_with(
    factory: MockStorageFactory,
    sink: &Arc<Mutex<MetadataSink>>,
) -> SequentialWriter {
    SequentialWriter::with_components(
        Box::new(factory),
        Box::new(MockConverterFactory::default()),
        Box::new(MockMetadataIo {
            sink: Arc::clone(sink),
        }),
    )
}

/// Register a callback collecting every fired `BagSplitInfo`.
fn capture_events(writer: &mut SequentialWriter) -> Arc<Mutex<Vec<BagSplitInfo>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    writer.add_event_callbacks(WriterEventCallbacks::new().with_split(move |info| {
        sink.lock().unwrap().push(info.clone());
    }));
    events
}

// ============================================================================
// Metadata persistence
// ============================================================================

#[test]
fn test_metadata_persisted_at_open_and_close() {
    let (dir, _guard) = temp_bag_dir("open_close");
    let (mut writer, log, sink) = mock_writer();

    writer
        .open(StorageOptions::new(&dir), ConverterOptions::default())
        .unwrap();
    writer.create_topic(&chatter_topic()).unwrap();
    for ts in 0..3 {
        writer.write(msg(ts)).unwrap();
    }
    writer.close().unwrap();

    let base = stem(&dir);
    let log = log.lock().unwrap();
    assert_eq!(log.opened_files, vec![format!("{base}_0")]);
    assert_eq!(log.metadata_updates.len(), 2);

    let initial = &log.metadata_updates[0].1;
    assert_eq!(initial.message_count, 0);
    assert_eq!(initial.storage_identifier, "mock");
    assert!(initial.compression_mode.is_empty());
    assert_eq!(initial.files.len(), 1);
    assert_eq!(initial.relative_file_paths, vec![format!("{base}_0")]);

    let last = &log.metadata_updates[1].1;
    assert_eq!(last.message_count, 3);
    assert_eq!(last.files.len(), 1);
    assert_eq!(last.files[0].message_count, 3);

    let sink = sink.lock().unwrap();
    assert_eq!(sink.written.len(), 1);
    assert_eq!(sink.written[0].0, dir);
    assert_eq!(sink.written[0].1.message_count, 3);
}

#[test]
fn test_double_close_is_noop() {
    let (dir, _guard) = temp_bag_dir("double_close");
    let (mut writer, log, sink) = mock_writer();
    let events = capture_events(&mut writer);

    writer
        .open(StorageOptions::new(&dir), ConverterOptions::default())
        .unwrap();
    writer.close().unwrap();
    writer.close().unwrap();

    assert_eq!(log.lock().unwrap().metadata_updates.len(), 2);
    assert_eq!(sink.lock().unwrap().written.len(), 1);
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[test]
fn test_drop_closes_open_writer() {
    let (dir, _guard) = temp_bag_dir("drop");
    let (mut writer, log, sink) = mock_writer();

    writer
        .open(StorageOptions::new(&dir), ConverterOptions::default())
        .unwrap();
    writer.create_topic(&chatter_topic()).unwrap();
    writer.write(msg(7)).unwrap();
    drop(writer);

    assert_eq!(log.lock().unwrap().metadata_updates.len(), 2);
    let sink = sink.lock().unwrap();
    assert_eq!(sink.written.len(), 1);
    assert_eq!(sink.written[0].1.message_count, 1);
}

// ============================================================================
// Direct mode
// ============================================================================

#[test]
fn test_direct_mode_writes_individually() {
    let (dir, _guard) = temp_bag_dir("direct");
    let (mut writer, log, _sink) = mock_writer();

    writer
        .open(StorageOptions::new(&dir), ConverterOptions::default())
        .unwrap();
    writer.create_topic(&chatter_topic()).unwrap();
    for ts in 0..10 {
        writer.write(msg(ts)).unwrap();
    }
    writer.close().unwrap();

    let base = stem(&dir);
    let log = log.lock().unwrap();
    assert_eq!(log.single_writes.len(), 10);
    assert!(log
        .single_writes
        .iter()
        .all(|(file, _)| file == &format!("{base}_0")));
    assert!(log.batches.is_empty());
    assert_eq!(log.metadata_updates.last().unwrap().1.message_count, 10);
}

#[test]
fn test_direct_write_failure_propagates() {
    let (dir, _guard) = temp_bag_dir("direct_fail");
    let log = Arc::new(Mutex::new(RecorderLog::default()));
    let sink = Arc::new(Mutex::new(MetadataSink::default()));
    let mut writer = writer_with(
        MockStorageFactory::new(Arc::clone(&log)).failing_writes(),
        &sink,
    );

    writer
        .open(StorageOptions::new(&dir), ConverterOptions::default())
        .unwrap();
    writer.create_topic(&chatter_topic()).unwrap();
    let err = writer.write(msg(1)).unwrap_err();
    assert!(matches!(err, BagError::Storage { .. }));
}

#[test]
fn test_out_of_order_timestamps_widen_bounds() {
    let (dir, _guard) = temp_bag_dir("out_of_order");
    let (mut writer, log, _sink) = mock_writer();

    writer
        .open(StorageOptions::new(&dir), ConverterOptions::default())
        .unwrap();
    writer.create_topic(&chatter_topic()).unwrap();
    for ts in [100, 300, 200, 500, 400, 600] {
        writer.write(msg(ts)).unwrap();
    }
    writer.close().unwrap();

    let log = log.lock().unwrap();
    let last = &log.metadata_updates.last().unwrap().1;
    assert_eq!(last.starting_time_ns, Some(100));
    assert_eq!(last.duration_ns, 500);
    assert_eq!(last.message_count, 6);
    assert_eq!(last.files[0].starting_time_ns, Some(100));
    assert_eq!(last.files[0].duration_ns, 500);
}

// ============================================================================
// Size-based splitting
// ============================================================================

#[test]
fn test_size_split_rotates_numbered_files() {
    let (dir, _guard) = temp_bag_dir("size_split");
    let (mut writer, log, _sink) = mock_writer();

    writer
        .open(
            StorageOptions::new(&dir).with_max_bagfile_size(5),
            ConverterOptions::default(),
        )
        .unwrap();
    writer.create_topic(&chatter_topic()).unwrap();
    for ts in 0..15 {
        writer.write(msg(ts)).unwrap();
    }
    writer.close().unwrap();

    let base = stem(&dir);
    let log = log.lock().unwrap();
    assert_eq!(
        log.opened_files,
        vec![
            format!("{base}_0"),
            format!("{base}_1"),
            format!("{base}_2")
        ]
    );
    for index in 0..3u64 {
        let name = format!("{base}_{index}");
        let count = log
            .single_writes
            .iter()
            .filter(|(file, _)| file == &name)
            .count();
        assert_eq!(count, 5, "file {name} should hold 5 messages");
    }

    // open + two splits (closing, opening each) + close
    assert_eq!(log.files_len_sequence(), vec![1, 1, 1, 2, 2, 3]);

    let last = &log.metadata_updates.last().unwrap().1;
    assert_eq!(last.message_count, 15);
    assert_eq!(
        last.relative_file_paths,
        vec![
            format!("{base}_0"),
            format!("{base}_1"),
            format!("{base}_2")
        ]
    );
    let per_file: Vec<u64> = last.files.iter().map(|f| f.message_count).collect();
    assert_eq!(per_file, vec![5, 5, 5]);
    // The message triggering a split lands in the new file
    assert_eq!(last.files[1].starting_time_ns, Some(5));
    assert_eq!(last.files[1].duration_ns, 4);
}

#[test]
fn test_single_split_metadata_sequence() {
    let (dir, _guard) = temp_bag_dir("one_split");
    let (mut writer, log, _sink) = mock_writer();

    writer
        .open(
            StorageOptions::new(&dir).with_max_bagfile_size(5),
            ConverterOptions::default(),
        )
        .unwrap();
    writer.create_topic(&chatter_topic()).unwrap();
    for ts in 0..10 {
        writer.write(msg(ts)).unwrap();
    }
    writer.close().unwrap();

    let base = stem(&dir);
    let log = log.lock().unwrap();
    assert_eq!(log.metadata_updates.len(), 4);
    assert_eq!(log.files_len_sequence(), vec![1, 1, 1, 2]);
    assert_eq!(
        log.update_stems(),
        vec![
            format!("{base}_0"),
            format!("{base}_0"),
            format!("{base}_1"),
            format!("{base}_1")
        ]
    );
    // Closing and opening backends receive the same snapshot
    assert_eq!(log.metadata_updates[1].1, log.metadata_updates[2].1);
    assert_eq!(log.metadata_updates[1].1.message_count, 5);

    let last = &log.metadata_updates[3].1;
    assert_eq!(last.message_count, 10);
    let per_file: Vec<u64> = last.files.iter().map(|f| f.message_count).collect();
    assert_eq!(per_file, vec![5, 5]);
}

#[test]
fn test_open_rejects_split_size_below_minimum() {
    let (dir, _guard) = temp_bag_dir("min_split");
    let log = Arc::new(Mutex::new(RecorderLog::default()));
    let sink = Arc::new(Mutex::new(MetadataSink::default()));
    let mut writer = writer_with(
        MockStorageFactory::new(Arc::clone(&log)).with_minimum_split_size(100),
        &sink,
    );

    let err = writer
        .open(
            StorageOptions::new(&dir).with_max_bagfile_size(50),
            ConverterOptions::default(),
        )
        .unwrap_err();
    match err {
        BagError::InvalidSplitSize { specified, minimum } => {
            assert_eq!(specified, 50);
            assert_eq!(minimum, 100);
        }
        other => panic!("expected InvalidSplitSize, got {other:?}"),
    }
    assert!(!writer.is_open());
    // The backend is consulted for its minimum, so the first file was opened
    assert_eq!(log.lock().unwrap().opened_files.len(), 1);
    assert!(log.lock().unwrap().metadata_updates.is_empty());
    assert!(sink.lock().unwrap().written.is_empty());
}

// ============================================================================
// Cached mode
// ============================================================================

#[test]
fn test_cached_writes_batch_to_storage() {
    let (dir, _guard) = temp_bag_dir("cached");
    let (mut writer, log, sink) = mock_writer();

    writer
        .open(
            StorageOptions::new(&dir).with_max_cache_size(1 << 20),
            ConverterOptions::default(),
        )
        .unwrap();
    writer.create_topic(&chatter_topic()).unwrap();
    for ts in 0..100 {
        writer.write(msg(ts)).unwrap();
    }
    writer.close().unwrap();

    let log = log.lock().unwrap();
    assert!(log.single_writes.is_empty());
    assert_eq!(log.batched_total(), 100);
    // Batch boundaries are arrival-driven, but order is preserved
    assert_eq!(log.batched_timestamps(), (0..100).collect::<Vec<u64>>());
    assert_eq!(log.metadata_updates.last().unwrap().1.message_count, 100);
    assert_eq!(sink.lock().unwrap().written.len(), 1);
}

#[test]
fn test_cached_split_flushes_and_fires_callbacks() {
    let (dir, _guard) = temp_bag_dir("cached_split");
    let (mut writer, log, _sink) = mock_writer();
    let events = capture_events(&mut writer);

    writer
        .open(
            StorageOptions::new(&dir).with_max_cache_size(1 << 20),
            ConverterOptions::default(),
        )
        .unwrap();
    writer.create_topic(&chatter_topic()).unwrap();
    for ts in 0..5 {
        writer.write(msg(ts)).unwrap();
    }
    writer.split_bagfile().unwrap();
    for ts in 5..10 {
        writer.write(msg(ts)).unwrap();
    }
    writer.close().unwrap();

    let base = stem(&dir);
    let log = log.lock().unwrap();
    // The flush barrier pins every pre-split message to the first file
    for (file, timestamps) in &log.batches {
        if file == &format!("{base}_0") {
            assert!(timestamps.iter().all(|ts| *ts < 5));
        } else {
            assert!(timestamps.iter().all(|ts| *ts >= 5));
        }
    }
    assert_eq!(log.batched_total(), 10);
    assert_eq!(log.files_len_sequence(), vec![1, 1, 1, 2]);

    let last = &log.metadata_updates.last().unwrap().1;
    let per_file: Vec<u64> = last.files.iter().map(|f| f.message_count).collect();
    assert_eq!(per_file, vec![5, 5]);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0].closed_file,
        dir.join(format!("{base}_0")).to_string_lossy()
    );
    assert_eq!(
        events[0].opened_file,
        dir.join(format!("{base}_1")).to_string_lossy()
    );
    assert_eq!(
        events[1].closed_file,
        dir.join(format!("{base}_1")).to_string_lossy()
    );
    assert!(events[1].opened_file.is_empty());
}

#[test]
fn test_cached_size_split_under_backpressure() {
    let (dir, _guard) = temp_bag_dir("cached_backpressure");
    let (mut writer, log, _sink) = mock_writer();

    // A one-byte budget makes every push wait for the previous drain, so
    // the backend size the split check reads stays close to reality.
    writer
        .open(
            StorageOptions::new(&dir)
                .with_max_cache_size(1)
                .with_max_bagfile_size(5),
            ConverterOptions::default(),
        )
        .unwrap();
    writer.create_topic(&chatter_topic()).unwrap();
    for ts in 0..1000 {
        writer.write(msg(ts)).unwrap();
    }
    writer.close().unwrap();

    let log = log.lock().unwrap();
    assert!(log.opened_files.len() >= 2, "expected at least one split");
    assert_eq!(log.batched_total(), 1000);
    assert_eq!(log.batched_timestamps(), (0..1000).collect::<Vec<u64>>());

    let last = &log.metadata_updates.last().unwrap().1;
    assert_eq!(last.message_count, 1000);
    let sum: u64 = last.files.iter().map(|f| f.message_count).sum();
    assert_eq!(sum, 1000);
}

#[test]
fn test_deferred_batch_error_surfaces_at_close() {
    let (dir, _guard) = temp_bag_dir("deferred_close");
    let log = Arc::new(Mutex::new(RecorderLog::default()));
    let sink = Arc::new(Mutex::new(MetadataSink::default()));
    let mut writer = writer_with(
        MockStorageFactory::new(Arc::clone(&log)).failing_batches(),
        &sink,
    );
    let events = capture_events(&mut writer);

    writer
        .open(
            StorageOptions::new(&dir).with_max_cache_size(1 << 20),
            ConverterOptions::default(),
        )
        .unwrap();
    writer.create_topic(&chatter_topic()).unwrap();
    writer.write(msg(1)).unwrap();

    let err = writer.close().unwrap_err();
    assert!(matches!(err, BagError::Storage { .. }));
    // Close still ran to completion
    assert!(!writer.is_open());
    assert_eq!(sink.lock().unwrap().written.len(), 1);
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[test]
fn test_deferred_batch_error_aborts_split() {
    let (dir, _guard) = temp_bag_dir("deferred_split");
    let log = Arc::new(Mutex::new(RecorderLog::default()));
    let sink = Arc::new(Mutex::new(MetadataSink::default()));
    let mut writer = writer_with(
        MockStorageFactory::new(Arc::clone(&log)).failing_batches(),
        &sink,
    );

    writer
        .open(
            StorageOptions::new(&dir).with_max_cache_size(1 << 20),
            ConverterOptions::default(),
        )
        .unwrap();
    writer.create_topic(&chatter_topic()).unwrap();
    writer.write(msg(1)).unwrap();

    let err = writer.split_bagfile().unwrap_err();
    assert!(matches!(err, BagError::Storage { .. }));
    // The split aborted before rotating
    assert!(writer.is_open());
    assert_eq!(log.lock().unwrap().opened_files.len(), 1);

    // The deferred slot was drained, so close completes cleanly
    writer.close().unwrap();
}

#[test]
fn test_failed_split_keeps_metadata_consistent() {
    let (dir, _guard) = temp_bag_dir("failed_split");
    let log = Arc::new(Mutex::new(RecorderLog::default()));
    let sink = Arc::new(Mutex::new(MetadataSink::default()));
    let factory = MockStorageFactory::new(Arc::clone(&log));
    let failures = Arc::clone(&factory.metadata_failures);
    let mut writer = writer_with(factory, &sink);

    writer
        .open(StorageOptions::new(&dir), ConverterOptions::default())
        .unwrap();
    writer.create_topic(&chatter_topic()).unwrap();
    for ts in 0..5 {
        writer.write(msg(ts)).unwrap();
    }

    // The update that closes the current file fails; the split aborts and
    // the writer stays on the first file.
    failures.store(1, Ordering::SeqCst);
    let err = writer.split_bagfile().unwrap_err();
    assert!(matches!(err, BagError::Storage { .. }));
    assert!(writer.is_open());
    assert_eq!(log.lock().unwrap().opened_files.len(), 1);

    for ts in 5..7 {
        writer.write(msg(ts)).unwrap();
    }
    writer.close().unwrap();

    let base = stem(&dir);
    let log = log.lock().unwrap();
    assert_eq!(log.single_writes.len(), 7);
    // Only the open and close updates landed; nothing from the aborted split
    assert_eq!(log.update_stems(), vec![format!("{base}_0"), format!("{base}_0")]);
    assert_eq!(log.files_len_sequence(), vec![1, 1]);

    // The file finalized twice; its stats reflect every message it holds
    let sink = sink.lock().unwrap();
    let final_metadata = &sink.written[0].1;
    assert_eq!(final_metadata.relative_file_paths, vec![format!("{base}_0")]);
    assert_eq!(final_metadata.files.len(), 1);
    assert_eq!(final_metadata.files[0].message_count, 7);
    assert_eq!(final_metadata.files[0].starting_time_ns, Some(0));
    assert_eq!(final_metadata.files[0].duration_ns, 6);
    assert_eq!(final_metadata.message_count, 7);
    assert_eq!(final_metadata.bag_size, 7);
}

// ============================================================================
// Topics
// ============================================================================

#[test]
fn test_write_unknown_topic_fails() {
    let (dir, _guard) = temp_bag_dir("unknown_topic");
    let (mut writer, log, _sink) = mock_writer();

    writer
        .open(StorageOptions::new(&dir), ConverterOptions::default())
        .unwrap();
    let err = writer.write(msg(1)).unwrap_err();
    match err {
        BagError::UnknownTopic { topic } => assert_eq!(topic, "/chatter"),
        other => panic!("expected UnknownTopic, got {other:?}"),
    }
    writer.close().unwrap();

    let log = log.lock().unwrap();
    assert!(log.single_writes.is_empty());
    assert_eq!(log.metadata_updates.last().unwrap().1.message_count, 0);
}

#[test]
fn test_topic_registration_rules() {
    let (dir, _guard) = temp_bag_dir("topics");
    let (mut writer, _log, _sink) = mock_writer();

    writer
        .open(StorageOptions::new(&dir), ConverterOptions::default())
        .unwrap();

    writer.create_topic(&chatter_topic()).unwrap();
    // Identical re-registration is a no-op
    writer.create_topic(&chatter_topic()).unwrap();

    let conflicting =
        TopicMetadata::new(0, "/chatter", "std_msgs/msg/Int32").with_serialization_format("cdr");
    let err = writer.create_topic(&conflicting).unwrap_err();
    assert!(matches!(err, BagError::TopicAlreadyRegistered { .. }));

    let unknown = TopicMetadata::new(1, "/nope", "std_msgs/msg/String");
    let err = writer.remove_topic(&unknown).unwrap_err();
    assert!(matches!(err, BagError::UnknownTopic { .. }));

    writer.remove_topic(&chatter_topic()).unwrap();
    let err = writer.write(msg(1)).unwrap_err();
    assert!(matches!(err, BagError::UnknownTopic { .. }));
    writer.close().unwrap();
}

#[test]
fn test_removed_topic_leaves_remaining_counts() {
    let (dir, _guard) = temp_bag_dir("remove_counts");
    let (mut writer, log, _sink) = mock_writer();

    writer
        .open(StorageOptions::new(&dir), ConverterOptions::default())
        .unwrap();
    let imu = TopicMetadata::new(1, "/imu", "sensor_msgs/msg/Imu").with_serialization_format("cdr");
    writer.create_topic(&chatter_topic()).unwrap();
    writer.create_topic(&imu).unwrap();

    writer.write(msg(1)).unwrap();
    writer
        .write(Arc::new(
            SerializedMessage::new("/imu", vec![0u8; 10]).with_timestamp(2),
        ))
        .unwrap();
    writer
        .write(Arc::new(
            SerializedMessage::new("/imu", vec![0u8; 10]).with_timestamp(3),
        ))
        .unwrap();

    writer.remove_topic(&chatter_topic()).unwrap();
    writer.close().unwrap();

    let log = log.lock().unwrap();
    let last = &log.metadata_updates.last().unwrap().1;
    assert_eq!(last.topics_with_message_count.len(), 1);
    assert_eq!(
        last.topics_with_message_count[0].topic_metadata.name,
        "/imu"
    );
    assert_eq!(last.message_count, 2);
}

// ============================================================================
// Format conversion
// ============================================================================

#[test]
fn test_conversion_applied_per_message() {
    let (dir, _guard) = temp_bag_dir("convert");
    let log = Arc::new(Mutex::new(RecorderLog::default()));
    let sink = Arc::new(Mutex::new(MetadataSink::default()));
    let converter_factory = MockConverterFactory {
        known_deserializer: "cdr".to_string(),
        known_serializer: "json".to_string(),
        ..MockConverterFactory::default()
    };
    let deserialize_calls = Arc::clone(&converter_factory.deserialize_calls);
    let serialize_calls = Arc::clone(&converter_factory.serialize_calls);
    let mut writer = SequentialWriter::with_components(
        Box::new(MockStorageFactory::new(Arc::clone(&log))),
        Box::new(converter_factory),
        Box::new(MockMetadataIo {
            sink: Arc::clone(&sink),
        }),
    );

    writer
        .open(
            StorageOptions::new(&dir),
            ConverterOptions::new("cdr", "json"),
        )
        .unwrap();
    writer.create_topic(&chatter_topic()).unwrap();
    for ts in 0..4 {
        writer
            .write(Arc::new(
                SerializedMessage::new("/chatter", vec![1, 2, 3]).with_timestamp(ts),
            ))
            .unwrap();
    }
    writer.close().unwrap();

    assert_eq!(deserialize_calls.load(Ordering::SeqCst), 4);
    assert_eq!(serialize_calls.load(Ordering::SeqCst), 4);

    let log = log.lock().unwrap();
    assert_eq!(log.payloads.len(), 4);
    for payload in &log.payloads {
        assert_eq!(payload, &vec![1, 2, 3, 0xD0, 0x5E]);
    }
}

#[test]
fn test_equal_formats_never_consult_factory() {
    let (dir, _guard) = temp_bag_dir("no_convert");
    let log = Arc::new(Mutex::new(RecorderLog::default()));
    let sink = Arc::new(Mutex::new(MetadataSink::default()));
    // This factory knows no formats, so any consultation would fail the open
    let converter_factory = MockConverterFactory::default();
    let consults = Arc::clone(&converter_factory.consults);
    let mut writer = SequentialWriter::with_components(
        Box::new(MockStorageFactory::new(Arc::clone(&log))),
        Box::new(converter_factory),
        Box::new(MockMetadataIo {
            sink: Arc::clone(&sink),
        }),
    );

    writer
        .open(
            StorageOptions::new(&dir),
            ConverterOptions::new("cdr", "cdr"),
        )
        .unwrap();
    assert_eq!(consults.load(Ordering::SeqCst), 0);
    writer.close().unwrap();
}

#[test]
fn test_missing_converter_aborts_open() {
    let (dir, _guard) = temp_bag_dir("missing_convert");
    let log = Arc::new(Mutex::new(RecorderLog::default()));
    let sink = Arc::new(Mutex::new(MetadataSink::default()));
    let converter_factory = MockConverterFactory {
        known_deserializer: "cdr".to_string(),
        known_serializer: "json".to_string(),
        ..MockConverterFactory::default()
    };
    let mut writer = SequentialWriter::with_components(
        Box::new(MockStorageFactory::new(Arc::clone(&log))),
        Box::new(converter_factory),
        Box::new(MockMetadataIo {
            sink: Arc::clone(&sink),
        }),
    );

    let err = writer
        .open(
            StorageOptions::new(&dir),
            ConverterOptions::new("cdr", "exotic"),
        )
        .unwrap_err();
    match err {
        BagError::ConverterNotFound { format, role } => {
            assert_eq!(format, "exotic");
            assert_eq!(role, "serializer");
        }
        other => panic!("expected ConverterNotFound, got {other:?}"),
    }

    let err = writer
        .open(
            StorageOptions::new(&dir),
            ConverterOptions::new("exotic", "json"),
        )
        .unwrap_err();
    match err {
        BagError::ConverterNotFound { format, role } => {
            assert_eq!(format, "exotic");
            assert_eq!(role, "deserializer");
        }
        other => panic!("expected ConverterNotFound, got {other:?}"),
    }

    // Converter resolution precedes any filesystem work
    assert!(!dir.exists());
    assert!(log.lock().unwrap().opened_files.is_empty());
}

// ============================================================================
// Lifecycle misuse
// ============================================================================

#[test]
fn test_second_open_fails() {
    let (dir, _guard) = temp_bag_dir("reopen");
    let (mut writer, _log, _sink) = mock_writer();

    writer
        .open(StorageOptions::new(&dir), ConverterOptions::default())
        .unwrap();
    let err = writer
        .open(StorageOptions::new(&dir), ConverterOptions::default())
        .unwrap_err();
    assert!(matches!(err, BagError::AlreadyOpen));

    // The first session is unaffected
    writer.create_topic(&chatter_topic()).unwrap();
    writer.write(msg(1)).unwrap();
    writer.close().unwrap();
}

#[test]
fn test_operations_on_closed_writer_fail() {
    let (dir, _guard) = temp_bag_dir("closed_ops");
    let (mut writer, _log, _sink) = mock_writer();

    writer
        .open(StorageOptions::new(&dir), ConverterOptions::default())
        .unwrap();
    writer.close().unwrap();

    let err = writer.write(msg(1)).unwrap_err();
    assert!(matches!(err, BagError::NotOpen { .. }));
    let err = writer.create_topic(&chatter_topic()).unwrap_err();
    assert!(matches!(err, BagError::NotOpen { .. }));
    let err = writer.split_bagfile().unwrap_err();
    assert!(matches!(err, BagError::NotOpen { .. }));
}
