//! Durable tier
//!
//! Append-only region of one shard, addressed by record offset:
//!
//! ```text
//! ┌──────────────┬──────────────┬─────┬──────────────────────┬──────────────┐
//! │  record 0    │  record 1    │ ... │ record flushed-1     │ zero growth  │
//! └──────────────┴──────────────┴─────┴──────────────────────┴──────────────┘
//! 0              272            544   (flushed-1)*272        flushed*272
//! ```
//!
//! Only whole buffer bodies are ever written, always at the current
//! `flushed_count * RECORD_SIZE`. The file length is rounded up to the
//! growth step, so it says nothing about how many records are valid; the
//! buffer tier's manager header is the source of truth.

use std::path::Path;

use crate::error::Result;

use super::MmapFile;

pub struct DurableTier {
    region: MmapFile,
    grow_bytes: u64,
}

impl DurableTier {
    /// Open or create the durable file at `path`
    pub fn open(path: &Path, grow_bytes: u64) -> Result<Self> {
        let region = MmapFile::open_or_create(path, grow_bytes)?;
        Ok(Self { region, grow_bytes })
    }

    /// Mapped length in bytes
    pub fn len(&self) -> u64 {
        self.region.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    pub fn was_created(&self) -> bool {
        self.region.was_created()
    }

    /// Copy `bytes` to `offset`, growing the mapping by whole steps as needed
    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let end = offset + bytes.len() as u64;
        if end > self.len() {
            let new_len = end.div_ceil(self.grow_bytes) * self.grow_bytes;
            tracing::debug!(
                path = %self.region.path().display(),
                old_len = self.len(),
                new_len,
                "Growing durable tier"
            );
            self.region.grow(new_len)?;
        }

        let start = offset as usize;
        self.region.as_mut_slice()[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// `len` bytes at `offset`, or `None` if the file is shorter
    pub fn read_at(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(offset).ok()?;
        self.region.as_slice().get(start..start.checked_add(len)?)
    }

    /// msync `len` bytes at `offset`
    pub fn sync_range(&self, offset: u64, len: usize) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        self.region.flush_range(offset as usize, len)
    }

    /// msync the whole region
    pub fn sync(&self) -> Result<()> {
        self.region.flush()
    }
}
