//! Memory-mapped file
//!
//! Shared building block of the buffer and durable tiers: a file that is
//! created (zero-filled) on first open, mapped read/write with `MAP_SHARED`,
//! and optionally grown and remapped.
//!
//! Writes land in the page cache as soon as they are stored, so they survive
//! a process crash without any syscall. `flush`/`flush_range` (msync) are only
//! needed for durability across power loss.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::Result;

#[derive(Debug)]
pub struct MmapFile {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    created: bool,
}

impl MmapFile {
    /// Open `path`, creating it if needed and extending it with zeros to at
    /// least `min_len` bytes
    pub fn open_or_create(path: &Path, min_len: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        let created = len == 0;
        if len < min_len {
            file.set_len(min_len)?;
        }

        // SAFETY: MmapMut::map_mut is unsafe because the file could be modified
        // externally while mapped. Tier files are owned by a single engine
        // instance and only ever touched through this mapping, and the mapping
        // lives exactly as long as `file`.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        tracing::debug!(
            path = %path.display(),
            len = mmap.len(),
            created,
            "Mapped tier file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap,
            created,
        })
    }

    /// Extend the file to `new_len` bytes and remap it
    ///
    /// Requires `&mut self`, so no slice into the old mapping can be alive.
    pub fn grow(&mut self, new_len: u64) -> Result<()> {
        if new_len <= self.mmap.len() as u64 {
            return Ok(());
        }

        self.mmap.flush_async()?;
        self.file.set_len(new_len)?;

        // SAFETY: same invariants as in `open_or_create`; the old mapping is
        // dropped by the assignment and cannot be borrowed because we hold
        // `&mut self`.
        self.mmap = unsafe { MmapMut::map_mut(&self.file)? };
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Whether the file did not exist (or was empty) before this open
    pub fn was_created(&self) -> bool {
        self.created
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Base address of the mapping; stable until the next `grow`
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    /// msync the whole mapping
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    /// msync `len` bytes starting at `offset`
    pub fn flush_range(&self, offset: usize, len: usize) -> Result<()> {
        self.mmap.flush_range(offset, len)?;
        Ok(())
    }
}
