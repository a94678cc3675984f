//! Tests for log recovery
//!
//! These tests verify:
//! - A reopened log replays exactly what was committed
//! - Recovery is idempotent across repeated reopens
//! - A buffer interrupted mid-flush is forced full and copied again
//! - A truncated durable tier ends replay of flushed records
//! - Partially filled buffers resume at their commit count
//! - An all-zero buffer tier recovers as empty

use std::fs;
use std::sync::Arc;

use platedb::log::{LogBufferManager, LogWriter};
use platedb::record::{record_id, Record, RecordBytes, RECORD_SIZE};
use platedb::tier::{
    buffer_file_name, durable_file_name, BufferTier, ManagerHeader, BUFFER_HEADER_SIZE,
    FLUSHING_NONE, MANAGER_HEADER_SIZE,
};
use platedb::Config;
use tempfile::TempDir;

const BUFFERS: usize = 3;
const CAPACITY: usize = 4;

// =============================================================================
// Helper Functions
// =============================================================================

fn config(temp_dir: &TempDir, grow_bytes: u64) -> Config {
    Config::builder()
        .data_dir(temp_dir.path())
        .shards(1)
        .buffers_per_shard(BUFFERS)
        .buffer_capacity(CAPACITY)
        .flush_poll_interval_ms(5)
        .durable_grow_bytes(grow_bytes)
        .build()
}

fn record(id: i64) -> RecordBytes {
    Record::new(id, format!("user{}", id), "crash", 1).encode()
}

fn replayed_ids(manager: &LogBufferManager) -> Vec<i64> {
    manager.reader().map(|r| record_id(&r)).collect()
}

/// Hand-built buffer tier file in the persisted layout
struct BufferImage {
    bytes: Vec<u8>,
}

impl BufferImage {
    fn new(flushed_count: u32, flushing_id: u32) -> Self {
        let mut bytes = vec![0u8; BufferTier::region_size(BUFFERS, CAPACITY) as usize];
        let header = ManagerHeader {
            flushed_count,
            flushing_id,
        };
        bytes[0..MANAGER_HEADER_SIZE].copy_from_slice(&header.encode());
        Self { bytes }
    }

    fn block(id: usize) -> usize {
        MANAGER_HEADER_SIZE + id * (BUFFER_HEADER_SIZE + CAPACITY * RECORD_SIZE)
    }

    /// Fill the body of buffer `id` and set its commit count
    fn buffer(mut self, id: usize, commit_count: u64, ids: &[i64]) -> Self {
        let block = Self::block(id);
        self.bytes[block..block + 8].copy_from_slice(&commit_count.to_le_bytes());
        for (slot, &record_id) in ids.iter().enumerate() {
            let start = block + BUFFER_HEADER_SIZE + slot * RECORD_SIZE;
            self.bytes[start..start + RECORD_SIZE].copy_from_slice(&record(record_id));
        }
        self
    }

    fn write(self, config: &Config) {
        fs::create_dir_all(&config.buffer_dir).unwrap();
        fs::write(config.buffer_dir.join(buffer_file_name(0)), self.bytes).unwrap();
    }
}

fn write_durable(config: &Config, ids: &[i64]) {
    fs::create_dir_all(&config.durable_dir).unwrap();
    let bytes: Vec<u8> = ids.iter().flat_map(|&id| record(id)).collect();
    fs::write(config.durable_dir.join(durable_file_name(0)), bytes).unwrap();
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_reopen_replays_committed_records() {
    let temp_dir = TempDir::new().unwrap();
    let config = config(&temp_dir, 4096);
    {
        let manager = Arc::new(LogBufferManager::open(0, &config).unwrap());
        let mut writer = LogWriter::new(Arc::clone(&manager));
        for id in 0..10 {
            writer.append(&record(id)).unwrap();
        }
    }

    let manager = LogBufferManager::open(0, &config).unwrap();
    let recovery = manager.recovery();

    assert_eq!(recovery.total(), 10);
    assert_eq!(recovery.forced_buffer, None);
    assert_eq!(replayed_ids(&manager), (0..10).collect::<Vec<_>>());
}

#[test]
fn test_repeated_reopen_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let config = config(&temp_dir, 4096);
    {
        let manager = Arc::new(LogBufferManager::open(0, &config).unwrap());
        let mut writer = LogWriter::new(Arc::clone(&manager));
        for id in 0..6 {
            writer.append(&record(id)).unwrap();
        }
    }

    for _ in 0..3 {
        let manager = LogBufferManager::open(0, &config).unwrap();
        assert_eq!(replayed_ids(&manager), (0..6).collect::<Vec<_>>());
    }
}

#[test]
fn test_appends_resume_after_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = config(&temp_dir, 4096);
    BufferImage::new(0, FLUSHING_NONE)
        .buffer(0, 2, &[1, 2])
        .write(&config);

    let manager = Arc::new(LogBufferManager::open(0, &config).unwrap());
    let mut writer = LogWriter::new(Arc::clone(&manager));
    writer.append(&record(3)).unwrap();

    assert_eq!(manager.buffer_tier().commit_count(0), 3);
    assert_eq!(replayed_ids(&manager), vec![1, 2, 3]);
}

#[test]
fn test_partial_buffers_replay_in_id_order() {
    let temp_dir = TempDir::new().unwrap();
    let config = config(&temp_dir, 4096);
    BufferImage::new(0, FLUSHING_NONE)
        .buffer(0, 2, &[10, 11])
        .buffer(2, 3, &[30, 31, 32])
        .write(&config);

    let manager = LogBufferManager::open(0, &config).unwrap();

    assert_eq!(manager.recovery().buffered_records, 5);
    assert_eq!(replayed_ids(&manager), vec![10, 11, 30, 31, 32]);
}

#[test]
fn test_uncommitted_slots_are_ignored() {
    let temp_dir = TempDir::new().unwrap();
    let config = config(&temp_dir, 4096);
    // Slot 2 holds bytes but the counter never advanced past 2
    BufferImage::new(0, FLUSHING_NONE)
        .buffer(0, 2, &[1, 2, 3])
        .write(&config);

    let manager = LogBufferManager::open(0, &config).unwrap();

    assert_eq!(replayed_ids(&manager), vec![1, 2]);
}

#[test]
fn test_zeroed_buffer_tier_recovers_empty() {
    let temp_dir = TempDir::new().unwrap();
    let config = config(&temp_dir, 4096);
    // Crash right after the file was sized, before any header was written
    fs::create_dir_all(&config.buffer_dir).unwrap();
    let size = BufferTier::region_size(BUFFERS, CAPACITY) as usize;
    fs::write(config.buffer_dir.join(buffer_file_name(0)), vec![0u8; size]).unwrap();

    let manager = LogBufferManager::open(0, &config).unwrap();

    assert!(!manager.buffer_tier().was_created());
    assert_eq!(manager.recovery().forced_buffer, None);
    assert_eq!(manager.recovery().total(), 0);
    manager.wait_for_flush().unwrap();
    assert_eq!(manager.flushed_count(), 0);
    assert!(replayed_ids(&manager).is_empty());
}

// =============================================================================
// Mid-Flush Crash Tests
// =============================================================================

#[test]
fn test_mid_flush_buffer_is_forced_full() {
    let temp_dir = TempDir::new().unwrap();
    let config = config(&temp_dir, 4096);
    // Crash after the counter reset but before the header advanced
    BufferImage::new(0, 1)
        .buffer(1, 0, &[5, 6, 7, 8])
        .write(&config);

    let manager = LogBufferManager::open(0, &config).unwrap();

    assert_eq!(manager.recovery().forced_buffer, Some(1));
    assert_eq!(manager.recovery().buffered_records, 4);

    manager.wait_for_flush().unwrap();
    assert_eq!(manager.flushed_count(), 4);
    assert_eq!(manager.buffer_tier().header().flushing(), None);
    assert_eq!(replayed_ids(&manager), vec![5, 6, 7, 8]);
}

#[test]
fn test_mid_flush_recopy_does_not_duplicate() {
    let temp_dir = TempDir::new().unwrap();
    let config = config(&temp_dir, 4096);
    // Crash after the body was copied but before the counter reset
    write_durable(&config, &[1, 2, 3, 4, 5, 6, 7, 8]);
    BufferImage::new(4, 0)
        .buffer(0, 4, &[5, 6, 7, 8])
        .write(&config);

    {
        let manager = LogBufferManager::open(0, &config).unwrap();
        assert_eq!(manager.recovery().total(), 8);
        assert_eq!(replayed_ids(&manager), (1..9).collect::<Vec<_>>());
        manager.shutdown().unwrap();
        assert_eq!(manager.flushed_count(), 8);
    }

    let manager = LogBufferManager::open(0, &config).unwrap();
    assert_eq!(manager.recovery().forced_buffer, None);
    assert_eq!(manager.recovery().durable_records, 8);
    assert_eq!(manager.recovery().buffered_records, 0);
    assert_eq!(replayed_ids(&manager), (1..9).collect::<Vec<_>>());
}

// =============================================================================
// Truncation Tests
// =============================================================================

#[test]
fn test_truncated_durable_tier_ends_replay() {
    let temp_dir = TempDir::new().unwrap();
    // Growth step equal to four records so the file is not padded past them
    let config = config(&temp_dir, (4 * RECORD_SIZE) as u64);
    write_durable(&config, &[1, 2, 3, 4]);
    BufferImage::new(8, FLUSHING_NONE)
        .buffer(0, 1, &[9])
        .write(&config);

    let manager = LogBufferManager::open(0, &config).unwrap();

    assert_eq!(replayed_ids(&manager), vec![1, 2, 3, 4, 9]);
}
