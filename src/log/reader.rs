//! Log Reader
//!
//! Replays one shard: the durable tier up to `flushed_count`, then every
//! buffer in ascending id up to its commit count.

use parking_lot::MutexGuard;

use crate::record::{RecordBytes, RECORD_SIZE};
use crate::tier::{BufferTier, DurableTier};

#[derive(Debug, Clone, Copy)]
enum Cursor {
    Durable(u64),
    Buffer { id: u32, slot: usize },
    Done,
}

/// Sequential record iterator over one shard
///
/// Holds the shard's flush lock, so no buffer moves to the durable tier
/// mid-scan and every record is yielded exactly once.
pub struct LogReader<'a> {
    shard: usize,
    buffers: &'a BufferTier,
    durable: MutexGuard<'a, DurableTier>,
    flushed: u64,
    cursor: Cursor,
}

impl<'a> LogReader<'a> {
    pub(super) fn new(
        shard: usize,
        buffers: &'a BufferTier,
        durable: MutexGuard<'a, DurableTier>,
    ) -> Self {
        let flushed = u64::from(buffers.header().flushed_count);
        Self {
            shard,
            buffers,
            durable,
            flushed,
            cursor: Cursor::Durable(0),
        }
    }

    fn next_durable(&mut self, index: u64) -> Option<RecordBytes> {
        let bytes = self.durable.read_at(index * RECORD_SIZE as u64, RECORD_SIZE)?;
        let mut record = [0u8; RECORD_SIZE];
        record.copy_from_slice(bytes);
        Some(record)
    }
}

impl Iterator for LogReader<'_> {
    type Item = RecordBytes;

    fn next(&mut self) -> Option<RecordBytes> {
        loop {
            match self.cursor {
                Cursor::Durable(index) if index < self.flushed => {
                    if let Some(record) = self.next_durable(index) {
                        self.cursor = Cursor::Durable(index + 1);
                        return Some(record);
                    }
                    tracing::warn!(
                        shard = self.shard,
                        read = index,
                        expected = self.flushed,
                        durable_len = self.durable.len(),
                        "Durable tier truncated, ending replay of flushed records"
                    );
                    self.cursor = Cursor::Buffer { id: 0, slot: 0 };
                }
                Cursor::Durable(_) => self.cursor = Cursor::Buffer { id: 0, slot: 0 },
                Cursor::Buffer { id, .. } if id as usize >= self.buffers.buffer_count() => {
                    self.cursor = Cursor::Done;
                }
                Cursor::Buffer { id, slot } => match self.buffers.read_record(id, slot) {
                    Some(record) => {
                        self.cursor = Cursor::Buffer { id, slot: slot + 1 };
                        return Some(record);
                    }
                    None => self.cursor = Cursor::Buffer { id: id + 1, slot: 0 },
                },
                Cursor::Done => return None,
            }
        }
    }
}
