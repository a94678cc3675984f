//! Buffer tier
//!
//! One memory-mapped file per shard, split into a manager header and a fixed
//! number of log buffers:
//!
//! ```text
//! ┌──────────────────────────────┬─────────────────────────┬─────────────────────────┬───
//! │ flushed_count (4)            │ commit_count (8)        │ commit_count (8)        │
//! │ flushing_id+1 (4)            │ slot 0..N (N × 272)     │ slot 0..N (N × 272)     │ ...
//! └──────────────────────────────┴─────────────────────────┴─────────────────────────┴───
//!   manager header (8)             buffer 0                  buffer 1
//! ```
//!
//! The flushing id is stored off by one so the all-zero header of a freshly
//! created file reads as "nothing flushed, nothing mid-flush".
//!
//! The mapping is page aligned and every header field sits at a multiple of
//! eight bytes (272 = 34 × 8), so header words are accessed as `AtomicU64`.

use std::fs;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{PlateError, Result};
use crate::record::{RecordBytes, RECORD_SIZE};

use super::MmapFile;

/// Manager header size: flushed_count (4) + flushing_id (4)
pub const MANAGER_HEADER_SIZE: usize = 8;

/// Per-buffer header size: commit_count (8)
pub const BUFFER_HEADER_SIZE: usize = 8;

/// `flushing_id` value meaning no buffer is mid-flush
pub const FLUSHING_NONE: u32 = u32::MAX;

/// Crash-recovery metadata persisted at the start of the buffer tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerHeader {
    /// Records durably copied to the durable tier
    pub flushed_count: u32,
    /// Buffer currently being copied, or `FLUSHING_NONE`
    pub flushing_id: u32,
}

impl ManagerHeader {
    pub const EMPTY: ManagerHeader = ManagerHeader {
        flushed_count: 0,
        flushing_id: FLUSHING_NONE,
    };

    /// The buffer named as mid-flush, if any
    pub fn flushing(&self) -> Option<u32> {
        (self.flushing_id != FLUSHING_NONE).then_some(self.flushing_id)
    }

    /// Persisted little-endian form of the header word
    pub fn encode(self) -> [u8; MANAGER_HEADER_SIZE] {
        self.pack().to_le_bytes()
    }

    // flushed_count occupies bytes 0..4. FLUSHING_NONE wraps to 0 so a zeroed
    // word decodes as EMPTY.
    fn pack(self) -> u64 {
        u64::from(self.flushed_count) | (u64::from(self.flushing_id.wrapping_add(1)) << 32)
    }

    fn unpack(word: u64) -> Self {
        Self {
            flushed_count: word as u32,
            flushing_id: ((word >> 32) as u32).wrapping_sub(1),
        }
    }
}

/// Ownership token for one buffer of the tier
///
/// Not `Clone`: the holder is the only party allowed to append into the
/// buffer or hand it on. Tokens are minted by the log buffer manager and
/// circulate between its free and dirty queues.
#[derive(Debug, PartialEq, Eq)]
pub struct LogBuffer {
    id: u32,
}

impl LogBuffer {
    pub(crate) fn new(id: u32) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

/// Memory-mapped staging region of one shard
pub struct BufferTier {
    region: MmapFile,
    base: *mut u8,
    buffer_count: usize,
    capacity: usize,
}

// SAFETY: the mapping is never remapped after construction, so `base` stays
// valid for the life of `region`. Header words are only touched atomically.
// A buffer's slots are written only through `try_append`, which requires the
// buffer's `&mut LogBuffer` token, and only at indexes >= its commit count;
// readers only look below the commit count they loaded with Acquire. Counters
// are reset only by the flush path, which the log reader excludes by holding
// the shard's durable tier lock.
unsafe impl Send for BufferTier {}
unsafe impl Sync for BufferTier {}

impl BufferTier {
    /// Total file size for a given geometry
    pub fn region_size(buffer_count: usize, capacity: usize) -> u64 {
        (MANAGER_HEADER_SIZE + buffer_count * Self::block_size(capacity)) as u64
    }

    fn block_size(capacity: usize) -> usize {
        BUFFER_HEADER_SIZE + capacity * RECORD_SIZE
    }

    /// Open or create the buffer tier file at `path`
    pub fn open(path: &Path, buffer_count: usize, capacity: usize) -> Result<Self> {
        let expected = Self::region_size(buffer_count, capacity);
        let existing = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if existing != 0 && existing != expected {
            return Err(PlateError::Config(format!(
                "buffer tier {} is {} bytes, geometry requires {}",
                path.display(),
                existing,
                expected
            )));
        }
        let mut region = MmapFile::open_or_create(path, expected)?;
        let base = region.as_mut_ptr();

        Ok(Self {
            region,
            base,
            buffer_count,
            capacity,
        })
    }

    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    /// Record slots per buffer
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn was_created(&self) -> bool {
        self.region.was_created()
    }

    pub fn path(&self) -> &Path {
        self.region.path()
    }

    // =========================================================================
    // Manager Header
    // =========================================================================

    fn header_word(&self) -> &AtomicU64 {
        // SAFETY: offset 0 of a page-aligned mapping of at least 8 bytes.
        unsafe { &*(self.base as *const AtomicU64) }
    }

    pub fn header(&self) -> ManagerHeader {
        ManagerHeader::unpack(u64::from_le(self.header_word().load(Ordering::Acquire)))
    }

    /// Replace both header fields with one 64-bit store
    pub(crate) fn store_header(&self, header: ManagerHeader) {
        self.header_word()
            .store(header.pack().to_le(), Ordering::Release);
    }

    /// msync the header word
    pub(crate) fn sync_header(&self) -> Result<()> {
        self.region.flush_range(0, MANAGER_HEADER_SIZE)
    }

    // =========================================================================
    // Buffers
    // =========================================================================

    fn block_offset(&self, id: u32) -> usize {
        debug_assert!((id as usize) < self.buffer_count);
        MANAGER_HEADER_SIZE + id as usize * Self::block_size(self.capacity)
    }

    fn counter(&self, id: u32) -> &AtomicU64 {
        assert!((id as usize) < self.buffer_count, "buffer id {} out of range", id);
        // SAFETY: in bounds (checked above) and 8-byte aligned (see module docs).
        unsafe { &*(self.base.add(self.block_offset(id)) as *const AtomicU64) }
    }

    fn slot_ptr(&self, id: u32, slot: usize) -> *mut u8 {
        debug_assert!(slot < self.capacity);
        // SAFETY: block_offset + header + slot * RECORD_SIZE stays inside the
        // buffer's block for slot < capacity.
        unsafe {
            self.base
                .add(self.block_offset(id) + BUFFER_HEADER_SIZE + slot * RECORD_SIZE)
        }
    }

    /// Committed record count of buffer `id`
    pub fn commit_count(&self, id: u32) -> u64 {
        u64::from_le(self.counter(id).load(Ordering::Acquire))
    }

    pub fn is_full(&self, id: u32) -> bool {
        self.commit_count(id) >= self.capacity as u64
    }

    /// Append one record, returning `false` when the buffer is already full
    ///
    /// The slot is written before the counter so a crash never exposes a
    /// committed slot with missing bytes.
    pub(crate) fn try_append(&self, buffer: &mut LogBuffer, record: &RecordBytes) -> bool {
        let count = self.commit_count(buffer.id);
        if count >= self.capacity as u64 {
            return false;
        }
        // SAFETY: the token grants exclusive write access to the buffer and
        // slot `count` is above every committed slot.
        unsafe {
            ptr::copy_nonoverlapping(
                record.as_ptr(),
                self.slot_ptr(buffer.id, count as usize),
                RECORD_SIZE,
            );
        }
        self.counter(buffer.id)
            .store((count + 1).to_le(), Ordering::Release);
        true
    }

    /// Whole body of a buffer owned by the caller (the flush path)
    pub(crate) fn body(&self, buffer: &LogBuffer) -> &[u8] {
        // SAFETY: the caller holds the token, so no writer appends concurrently.
        unsafe {
            std::slice::from_raw_parts(
                self.slot_ptr(buffer.id, 0),
                self.capacity * RECORD_SIZE,
            )
        }
    }

    /// Zero the commit counter after a flush
    pub(crate) fn reset(&self, buffer: &LogBuffer) {
        self.counter(buffer.id).store(0, Ordering::Release);
    }

    /// msync the commit counter of a buffer
    pub(crate) fn sync_counter(&self, buffer: &LogBuffer) -> Result<()> {
        self.region
            .flush_range(self.block_offset(buffer.id), BUFFER_HEADER_SIZE)
    }

    /// Mark every slot of buffer `id` as committed (recovery of a mid-flush buffer)
    pub(crate) fn force_full(&self, id: u32) {
        self.counter(id)
            .store((self.capacity as u64).to_le(), Ordering::Release);
    }

    /// Copy out committed slot `slot` of buffer `id`
    pub(crate) fn read_record(&self, id: u32, slot: usize) -> Option<RecordBytes> {
        if slot as u64 >= self.commit_count(id) {
            return None;
        }
        let mut record = [0u8; RECORD_SIZE];
        // SAFETY: slot is below the committed count, which is only ever
        // lowered by the flush path the caller excludes.
        unsafe {
            ptr::copy_nonoverlapping(self.slot_ptr(id, slot), record.as_mut_ptr(), RECORD_SIZE);
        }
        Some(record)
    }

    /// msync the whole tier
    pub fn sync(&self) -> Result<()> {
        self.region.flush()
    }
}
