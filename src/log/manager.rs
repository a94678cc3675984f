//! Log Buffer Manager
//!
//! Owns one shard's buffer pool and its background flush thread.
//!
//! ## Locking
//! - `free`: pool of empty or partially filled buffers (mutex + condvar)
//! - `dirty`: full buffers awaiting flush (mutex + condvar)
//! - `durable`: the durable tier; doubles as the flush lock. The flush task
//!   holds it for a whole flush, a `LogReader` for its whole scan.

use std::collections::VecDeque;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::config::Config;
use crate::error::{PlateError, Result};
use crate::record::{RecordBytes, RECORD_SIZE};
use crate::tier::{
    buffer_file_name, durable_file_name, BufferTier, DurableTier, LogBuffer, ManagerHeader,
    FLUSHING_NONE,
};

use super::LogReader;

/// What recovery found when a shard was opened
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Records already in the durable tier
    pub durable_records: u64,
    /// Committed records still in the buffer tier
    pub buffered_records: u64,
    /// Buffer that was mid-flush at the crash, now forced full
    pub forced_buffer: Option<u32>,
}

impl RecoveryStats {
    pub fn total(&self) -> u64 {
        self.durable_records + self.buffered_records
    }
}

#[derive(Default)]
struct DirtyQueue {
    queue: VecDeque<LogBuffer>,
    /// A buffer has been popped but its flush has not finished
    in_flight: bool,
}

impl DirtyQueue {
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && !self.in_flight
    }
}

/// State shared with the flush thread
struct Shared {
    shard: usize,
    buffers: BufferTier,
    durable: Mutex<DurableTier>,

    free: Mutex<VecDeque<LogBuffer>>,
    free_ready: Condvar,

    dirty: Mutex<DirtyQueue>,
    dirty_ready: Condvar,
    /// Signalled whenever the dirty queue drains
    dirty_idle: Condvar,

    shutdown: AtomicBool,
    failure: Mutex<Option<String>>,

    poll_interval: Duration,
    sync_on_flush: bool,
}

/// Buffer pool, flush task and recovery metadata of one shard
pub struct LogBufferManager {
    shared: Arc<Shared>,
    flusher: Mutex<Option<JoinHandle<()>>>,
    recovery: RecoveryStats,
}

impl LogBufferManager {
    /// Open (or create) the tiers of `shard`, recover, and start the flush task
    ///
    /// Recovery:
    /// 1. A fresh buffer tier gets an empty header
    /// 2. A buffer named by `flushing_id` is forced back to full
    /// 3. Full buffers are queued for flushing, the rest become free
    pub fn open(shard: usize, config: &Config) -> Result<Self> {
        fs::create_dir_all(&config.buffer_dir)?;
        fs::create_dir_all(&config.durable_dir)?;

        let buffers = BufferTier::open(
            &config.buffer_dir.join(buffer_file_name(shard)),
            config.buffers_per_shard,
            config.buffer_capacity,
        )?;
        if buffers.was_created() {
            buffers.store_header(ManagerHeader::EMPTY);
            buffers.sync_header()?;
        }
        let durable = DurableTier::open(
            &config.durable_dir.join(durable_file_name(shard)),
            config.durable_grow_bytes,
        )?;

        let header = buffers.header();
        let forced_buffer = header.flushing();
        if let Some(id) = forced_buffer {
            if id as usize >= buffers.buffer_count() {
                return Err(PlateError::Config(format!(
                    "shard {} header names buffer {} but only {} exist",
                    shard,
                    id,
                    buffers.buffer_count()
                )));
            }
            tracing::warn!(shard, buffer = id, "Recovering buffer interrupted mid-flush");
            buffers.force_full(id);
        }

        let mut free = VecDeque::with_capacity(buffers.buffer_count());
        let mut dirty = DirtyQueue::default();
        let mut buffered_records = 0;
        for id in 0..buffers.buffer_count() as u32 {
            buffered_records += buffers.commit_count(id);
            if buffers.is_full(id) {
                dirty.queue.push_back(LogBuffer::new(id));
            } else {
                free.push_back(LogBuffer::new(id));
            }
        }

        let recovery = RecoveryStats {
            durable_records: u64::from(header.flushed_count),
            buffered_records,
            forced_buffer,
        };
        if recovery.total() > 0 || forced_buffer.is_some() {
            tracing::info!(
                shard,
                durable = recovery.durable_records,
                buffered = recovery.buffered_records,
                pending_flush = dirty.queue.len(),
                "Recovered log shard"
            );
        }

        let shared = Arc::new(Shared {
            shard,
            buffers,
            durable: Mutex::new(durable),
            free: Mutex::new(free),
            free_ready: Condvar::new(),
            dirty: Mutex::new(dirty),
            dirty_ready: Condvar::new(),
            dirty_idle: Condvar::new(),
            shutdown: AtomicBool::new(false),
            failure: Mutex::new(None),
            poll_interval: config.flush_poll_interval(),
            sync_on_flush: config.sync_on_flush,
        });

        let flusher = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("platedb-flush-{}", shard))
                .spawn(move || shared.flush_loop())?
        };

        Ok(Self {
            shared,
            flusher: Mutex::new(Some(flusher)),
            recovery,
        })
    }

    // =========================================================================
    // Buffer Circulation
    // =========================================================================

    /// Take a buffer from the free pool, blocking while it is empty
    pub fn get_free_buffer(&self) -> Result<LogBuffer> {
        let mut free = self.shared.free.lock();
        loop {
            self.shared.check_failed()?;
            if let Some(buffer) = free.pop_front() {
                return Ok(buffer);
            }
            self.shared.free_ready.wait(&mut free);
        }
    }

    /// Queue a full buffer for the flush task
    ///
    /// A buffer that still has free slots goes back to the free pool instead,
    /// since a flush always copies and accounts for the whole capacity.
    pub fn give_back_dirty(&self, buffer: LogBuffer) {
        if !self.shared.buffers.is_full(buffer.id()) {
            tracing::debug!(
                shard = self.shared.shard,
                buffer = buffer.id(),
                "Buffer not full, returning it to the free pool"
            );
            self.shared.release(buffer);
            return;
        }
        let mut dirty = self.shared.dirty.lock();
        dirty.queue.push_back(buffer);
        self.shared.dirty_ready.notify_one();
    }

    /// Return a buffer that still has room to the free pool
    pub fn give_back_free(&self, buffer: LogBuffer) {
        self.shared.release(buffer);
    }

    pub(crate) fn try_append(&self, buffer: &mut LogBuffer, record: &RecordBytes) -> bool {
        self.shared.buffers.try_append(buffer, record)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn shard(&self) -> usize {
        self.shared.shard
    }

    pub fn capacity(&self) -> usize {
        self.shared.buffers.capacity()
    }

    pub fn buffer_tier(&self) -> &BufferTier {
        &self.shared.buffers
    }

    /// Records copied to the durable tier so far
    pub fn flushed_count(&self) -> u32 {
        self.shared.buffers.header().flushed_count
    }

    pub fn recovery(&self) -> &RecoveryStats {
        &self.recovery
    }

    /// Sequential reader over everything committed to this shard
    ///
    /// Blocks the flush task until the reader is dropped.
    pub fn reader(&self) -> LogReader<'_> {
        let durable = self.shared.durable.lock();
        LogReader::new(self.shard(), &self.shared.buffers, durable)
    }

    // =========================================================================
    // Sync / Shutdown
    // =========================================================================

    /// Block until every queued dirty buffer has been flushed
    pub fn wait_for_flush(&self) -> Result<()> {
        let mut dirty = self.shared.dirty.lock();
        while !dirty.is_idle() {
            self.shared.check_failed()?;
            self.shared
                .dirty_idle
                .wait_for(&mut dirty, self.shared.poll_interval);
        }
        drop(dirty);
        self.shared.check_failed()
    }

    /// msync both tiers
    pub fn sync(&self) -> Result<()> {
        self.shared.buffers.sync()?;
        self.shared.durable.lock().sync()
    }

    /// Stop the flush task after it drains the dirty queue, then msync
    ///
    /// Idempotent; later calls only re-sync.
    pub fn shutdown(&self) -> Result<()> {
        if let Some(handle) = self.flusher.lock().take() {
            self.shared.shutdown.store(true, Ordering::Release);
            {
                let _dirty = self.shared.dirty.lock();
                self.shared.dirty_ready.notify_all();
            }
            if handle.join().is_err() {
                return Err(PlateError::FlushFailed(format!(
                    "flush thread of shard {} panicked",
                    self.shared.shard
                )));
            }
            tracing::debug!(shard = self.shared.shard, "Flush task stopped");
        }
        self.shared.check_failed()?;
        self.sync()
    }
}

impl Drop for LogBufferManager {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(shard = self.shared.shard, error = %e, "Log shard shutdown failed");
        }
    }
}

// =============================================================================
// Flush Task
// =============================================================================

impl Shared {
    fn check_failed(&self) -> Result<()> {
        match self.failure.lock().as_ref() {
            Some(reason) => Err(PlateError::FlushFailed(reason.clone())),
            None => Ok(()),
        }
    }

    fn release(&self, buffer: LogBuffer) {
        let mut free = self.free.lock();
        free.push_back(buffer);
        self.free_ready.notify_one();
    }

    fn flush_loop(&self) {
        loop {
            let next = {
                let mut dirty = self.dirty.lock();
                loop {
                    if let Some(buffer) = dirty.queue.pop_front() {
                        dirty.in_flight = true;
                        break Some(buffer);
                    }
                    if self.shutdown.load(Ordering::Acquire) {
                        break None;
                    }
                    self.dirty_ready.wait_for(&mut dirty, self.poll_interval);
                }
            };
            let Some(buffer) = next else {
                return;
            };

            let result = self.flush(buffer);

            let mut dirty = self.dirty.lock();
            dirty.in_flight = false;
            if let Err(e) = result {
                tracing::error!(shard = self.shard, error = %e, "Flush failed, shard is now read-only");
                *self.failure.lock() = Some(e.to_string());
                self.dirty_idle.notify_all();
                drop(dirty);
                let _free = self.free.lock();
                self.free_ready.notify_all();
                return;
            }
            if dirty.queue.is_empty() {
                self.dirty_idle.notify_all();
            }
        }
    }

    /// Copy one full buffer to the durable tier and return it to the free pool
    fn flush(&self, buffer: LogBuffer) -> Result<()> {
        debug_assert!(self.buffers.is_full(buffer.id()));
        let mut durable = self.durable.lock();
        let header = self.buffers.header();
        let capacity = self.buffers.capacity() as u32;
        let flushed = header.flushed_count;
        let advanced = flushed.checked_add(capacity).ok_or_else(|| {
            PlateError::FlushFailed(format!(
                "shard {} durable record count would exceed {}",
                self.shard,
                u32::MAX
            ))
        })?;

        // Step 1: Mark the buffer as mid-flush
        self.buffers.store_header(ManagerHeader {
            flushed_count: flushed,
            flushing_id: buffer.id(),
        });
        if self.sync_on_flush {
            self.buffers.sync_header()?;
        }

        // Step 2: Copy the body
        let offset = u64::from(flushed) * RECORD_SIZE as u64;
        let body = self.buffers.body(&buffer);
        durable.write_at(offset, body)?;
        if self.sync_on_flush {
            durable.sync_range(offset, body.len())?;
        }

        // Step 3: Reset the buffer
        self.buffers.reset(&buffer);
        if self.sync_on_flush {
            self.buffers.sync_counter(&buffer)?;
        }

        // Step 4: Publish the new durable length
        self.buffers.store_header(ManagerHeader {
            flushed_count: advanced,
            flushing_id: FLUSHING_NONE,
        });
        if self.sync_on_flush {
            self.buffers.sync_header()?;
        }
        drop(durable);

        tracing::debug!(
            shard = self.shard,
            buffer = buffer.id(),
            flushed = advanced,
            "Flushed log buffer"
        );
        self.release(buffer);
        Ok(())
    }
}
