//! Log Module
//!
//! Per-shard append-only log spread over the two tiers.
//!
//! ## Buffer Lifecycle
//! ```text
//!            get_free_buffer()                 give_back_dirty()
//!   ┌──────┐ ─────────────────► ┌──────────┐ ───────────────────► ┌───────┐
//!   │ free │                    │  in use  │                      │ dirty │
//!   └──────┘ ◄───────────────── └──────────┘                      └───────┘
//!      ▲        counter reset                                         │
//!      └──────────────────── flush task copies body ◄─────────────────┘
//! ```
//!
//! ## Flush Protocol
//! 1. header = { flushed, flushing_id = id }
//! 2. copy body to the durable tier at `flushed * RECORD_SIZE`
//! 3. reset the buffer's commit count
//! 4. header = { flushed + capacity, flushing_id = NONE }
//!
//! A crash between 1 and 4 leaves `flushing_id` set. Recovery forces that
//! buffer back to full, so its still-intact body is copied again to the same
//! offset.
//!
//! ## Replay Order
//! The durable tier up to `flushed_count`, then every buffer in ascending id,
//! each up to its commit count.

mod manager;
mod reader;
mod writer;

pub use manager::{LogBufferManager, RecoveryStats};
pub use reader::LogReader;
pub use writer::LogWriter;
