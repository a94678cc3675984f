//! Configuration for PlateDB
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PlateError, Result};

/// Main configuration for a PlateDB instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Fast tier directory: memory-mapped log buffers and the manifest
    /// Internal structure:
    ///   {buffer_dir}/
    ///     ├── MANIFEST
    ///     └── BUFFER_00000000 .. BUFFER_{shards-1}
    pub buffer_dir: PathBuf,

    /// Slow tier directory: append-only durable regions
    /// Internal structure:
    ///   {durable_dir}/
    ///     └── DATA_00000000 .. DATA_{shards-1}
    pub durable_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Log Configuration
    // -------------------------------------------------------------------------
    /// Number of writer shards (one log buffer manager and one writer each)
    pub shards: usize,

    /// Number of log buffers in each shard's pool
    pub buffers_per_shard: usize,

    /// Record slots per log buffer
    pub buffer_capacity: usize,

    /// Growth step of the durable tier mapping (in bytes)
    pub durable_grow_bytes: u64,

    /// Bounded wait of the flush task before it re-checks for shutdown
    pub flush_poll_interval_ms: u64,

    /// msync the durable range and the manager header after every flush
    pub sync_on_flush: bool,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Index shards used in the Hybrid phase (1 = a single coarse lock)
    pub index_shards: usize,

    /// Sleep of the winning thread before a phase transition
    pub fence_interval_ms: u64,

    /// Record count that marks a fully loaded, read-dominated store.
    /// When the recovered count matches, a cluster index is built at startup.
    pub cluster_index_threshold: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_dir: PathBuf::from("./platedb_data/buffer"),
            durable_dir: PathBuf::from("./platedb_data/durable"),
            shards: 8,
            buffers_per_shard: 4,
            buffer_capacity: 16 * 1024,
            durable_grow_bytes: 64 * 1024 * 1024, // 64 MB
            flush_poll_interval_ms: 100,
            sync_on_flush: true,
            index_shards: 8,
            fence_interval_ms: 10,
            cluster_index_threshold: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the geometry is usable
    pub fn validate(&self) -> Result<()> {
        if self.shards == 0 {
            return Err(PlateError::Config("shards must be at least 1".to_string()));
        }
        if self.buffers_per_shard == 0 {
            return Err(PlateError::Config(
                "buffers_per_shard must be at least 1".to_string(),
            ));
        }
        // the flushing id is a u32 with u32::MAX reserved as "none"
        if self.buffers_per_shard >= u32::MAX as usize {
            return Err(PlateError::Config(format!(
                "buffers_per_shard {} does not fit the manager header",
                self.buffers_per_shard
            )));
        }
        if self.buffer_capacity == 0 {
            return Err(PlateError::Config(
                "buffer_capacity must be at least 1".to_string(),
            ));
        }
        if self.buffer_capacity > u32::MAX as usize {
            return Err(PlateError::Config(format!(
                "buffer_capacity {} does not fit the manager header",
                self.buffer_capacity
            )));
        }
        if self.index_shards == 0 {
            return Err(PlateError::Config(
                "index_shards must be at least 1".to_string(),
            ));
        }
        if self.durable_grow_bytes == 0 {
            return Err(PlateError::Config(
                "durable_grow_bytes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn flush_poll_interval(&self) -> Duration {
        Duration::from_millis(self.flush_poll_interval_ms)
    }

    pub fn fence_interval(&self) -> Duration {
        Duration::from_millis(self.fence_interval_ms)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the fast tier (log buffer) directory
    pub fn buffer_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.buffer_dir = path.into();
        self
    }

    /// Set the slow tier (durable) directory
    pub fn durable_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.durable_dir = path.into();
        self
    }

    /// Place both tiers under one root: `{root}/buffer` and `{root}/durable`
    pub fn data_dir(self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.buffer_dir(root.join("buffer"))
            .durable_dir(root.join("durable"))
    }

    /// Set the number of writer shards
    pub fn shards(mut self, count: usize) -> Self {
        self.config.shards = count;
        self
    }

    /// Set the number of buffers per shard
    pub fn buffers_per_shard(mut self, count: usize) -> Self {
        self.config.buffers_per_shard = count;
        self
    }

    /// Set the number of record slots per buffer
    pub fn buffer_capacity(mut self, records: usize) -> Self {
        self.config.buffer_capacity = records;
        self
    }

    /// Set the durable tier growth step (in bytes)
    pub fn durable_grow_bytes(mut self, bytes: u64) -> Self {
        self.config.durable_grow_bytes = bytes;
        self
    }

    /// Set the flush task poll interval (in milliseconds)
    pub fn flush_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.flush_poll_interval_ms = ms;
        self
    }

    /// Enable or disable msync after each flush
    pub fn sync_on_flush(mut self, enabled: bool) -> Self {
        self.config.sync_on_flush = enabled;
        self
    }

    /// Set the Hybrid phase index shard count
    pub fn index_shards(mut self, count: usize) -> Self {
        self.config.index_shards = count;
        self
    }

    /// Set the phase transition fence (in milliseconds)
    pub fn fence_interval_ms(mut self, ms: u64) -> Self {
        self.config.fence_interval_ms = ms;
        self
    }

    /// Build a cluster index when the store reopens with exactly this many records
    pub fn cluster_index_threshold(mut self, records: u64) -> Self {
        self.config.cluster_index_threshold = Some(records);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
