//! # PlateDB
//!
//! An embedded, single-table storage engine with:
//! - Fixed 272-byte records (id, user_id, name, salary)
//! - Memory-mapped log buffers tiered over an append-only durable region
//! - Crash recovery that replays the durable tier and the staged buffers
//! - Phase-adaptive indexing (write-only, read-only, hybrid)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Engine (append / read / sync / close)           │
//! │         phase state machine + per-context identity           │
//! └──────────────┬─────────────────────────────────┬────────────┘
//!                │ append                          │ read
//!                ▼                                 ▼
//!   ┌────────────────────────┐          ┌──────────────────────┐
//!   │ LogWriter × shards     │          │ ClusterIndex (opt.)  │
//!   │ (Mutex, cache padded)  │          │ IndexSet (sharded)   │
//!   └───────────┬────────────┘          └──────────▲───────────┘
//!               ▼                                  │ rebuild
//!   ┌────────────────────────┐   flush  ┌──────────┴───────────┐
//!   │ Buffer tier (mmap)     │ ───────► │ Durable tier (mmap)  │
//!   │ LogBufferManager       │          │ LogReader            │
//!   └────────────────────────┘          └──────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod record;
pub mod tier;
pub mod log;
pub mod manifest;
pub mod index;
pub mod engine;
pub mod interface;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use engine::{Context, Engine, EngineStats, Phase};
pub use error::{PlateError, Result};
pub use record::{Column, Record, RECORD_SIZE};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of PlateDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
