//! Tier Module
//!
//! The two persistent regions of every shard.
//!
//! ## Layout
//! ```text
//! fast tier (buffer_dir)                     slow tier (durable_dir)
//! ┌─────────────────────────────┐            ┌──────────────────────────┐
//! │ BUFFER_00000000             │   flush    │ DATA_00000000            │
//! │  header | buf 0 | buf 1 ... │ ─────────► │  rec 0 | rec 1 | ...     │
//! └─────────────────────────────┘            └──────────────────────────┘
//! ```
//!
//! Both are memory-mapped with `MAP_SHARED`. Appends land in the buffer tier;
//! the background flush task copies full buffers into the durable tier.

mod buffer;
mod durable;
mod mmap;

pub use buffer::{
    BufferTier, LogBuffer, ManagerHeader, BUFFER_HEADER_SIZE, FLUSHING_NONE,
    MANAGER_HEADER_SIZE,
};
pub use durable::DurableTier;
pub use mmap::MmapFile;

/// File name of a shard's buffer tier
pub fn buffer_file_name(shard: usize) -> String {
    format!("BUFFER_{:08}", shard)
}

/// File name of a shard's durable tier
pub fn durable_file_name(shard: usize) -> String {
    format!("DATA_{:08}", shard)
}
