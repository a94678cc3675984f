//! Engine Module
//!
//! Ties the log shards and the index set together and drives the phase
//! state machine.
//!
//! ## Data Flow
//! ```text
//! append ──► Context identity ──► LogWriter[shard] ──► buffer tier ──► flush ──► durable tier
//!    └──────────────────────────► IndexSet::insert (Hybrid only)
//!
//! read ──► phase check ──► ClusterIndex (if active) ──► IndexSet lookup ──► copy select field
//! ```
//!
//! ## Concurrency Model
//! Every append and read holds the outer index lock in read mode for its
//! whole duration, including the log append. A phase transition takes it in
//! write mode, so the rebuild sees a quiet log and no operation ever
//! observes a half-built index. Within Hybrid, index shards are locked
//! individually.

mod context;
mod phase;

pub use context::Context;
pub use phase::{Phase, PhaseState};

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::BufMut;
use crossbeam::utils::CachePadded;
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{PlateError, Result};
use crate::index::{ClusterIndex, IndexSet};
use crate::log::{LogBufferManager, LogWriter};
use crate::manifest::Manifest;
use crate::record::{as_record_bytes, Column, FieldKey};

struct IndexState {
    standard: IndexSet,
    cluster: Option<ClusterIndex>,
}

/// Point-in-time engine statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub phase: Phase,
    /// Records in the active index (zero in WriteOnly, where nothing is indexed)
    pub indexed_records: usize,
    /// `flushed_count` of every log shard
    pub flushed_per_shard: Vec<u32>,
    pub cluster_index_active: bool,
}

/// The storage engine
pub struct Engine {
    config: Config,
    managers: Vec<Arc<LogBufferManager>>,
    writers: Vec<CachePadded<Mutex<LogWriter>>>,
    phase: PhaseState,
    next_identity: AtomicUsize,
    index: RwLock<IndexState>,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate the config against the manifest
    /// 2. Open and recover every log shard
    /// 3. Empty store: WriteOnly, indexing deferred
    /// 4. Recovered store: ReadOnly with a consolidated index, plus a
    ///    cluster index if the record count matches the threshold
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Directories and manifest
        fs::create_dir_all(&config.buffer_dir)?;
        fs::create_dir_all(&config.durable_dir)?;
        Manifest::load_or_create(&config.buffer_dir, &config)?;

        // Step 2: Log shards
        let managers = (0..config.shards)
            .map(|shard| LogBufferManager::open(shard, &config).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        let recovered: u64 = managers.iter().map(|m| m.recovery().total()).sum();

        // Step 3/4: Initial phase and index
        let (phase, state) = if recovered == 0 {
            let state = IndexState {
                standard: IndexSet::new(config.index_shards),
                cluster: None,
            };
            (Phase::WriteOnly, state)
        } else {
            let standard = IndexSet::build(1, managers.iter().flat_map(|m| m.reader()));
            let cluster = match config.cluster_index_threshold {
                Some(threshold) if threshold == standard.len() as u64 => {
                    tracing::info!(records = threshold, "Building cluster index");
                    Some(ClusterIndex::build(&standard))
                }
                _ => None,
            };
            (Phase::ReadOnly, IndexState { standard, cluster })
        };

        let writers = managers
            .iter()
            .map(|m| CachePadded::new(Mutex::new(LogWriter::new(Arc::clone(m)))))
            .collect();

        tracing::info!(
            buffer_dir = %config.buffer_dir.display(),
            durable_dir = %config.durable_dir.display(),
            shards = config.shards,
            recovered,
            phase = %phase,
            "Engine opened"
        );

        Ok(Self {
            config,
            managers,
            writers,
            phase: PhaseState::new(phase),
            next_identity: AtomicUsize::new(0),
            index: RwLock::new(state),
        })
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Append one encoded record
    ///
    /// The first append to a ReadOnly store moves the engine to Hybrid.
    pub fn append(&self, ctx: &Context, record: &[u8]) -> Result<()> {
        let record = as_record_bytes(record)?;

        if self.phase.load() == Phase::ReadOnly {
            self.enter_hybrid()?;
        }

        let state = self.index.read();
        let phase = self.phase.load();
        let shard = self.must_assign_identity(ctx);
        self.writers[shard].lock().append(record)?;

        if phase == Phase::Hybrid {
            state.standard.insert(record);
        }
        Ok(())
    }

    /// Copy the `select` field of every record whose `where_column` equals
    /// `key` into `out`, returning the number of matches
    ///
    /// Fails with `OutputTooSmall` before writing anything if `out` cannot
    /// hold every match. The first read of a WriteOnly store builds the
    /// index and moves the engine to Hybrid.
    pub fn read<B: BufMut>(
        &self,
        select: Column,
        where_column: Column,
        key: &[u8],
        out: &mut B,
    ) -> Result<usize> {
        let key = FieldKey::parse(where_column, key)?;

        if self.phase.load() == Phase::WriteOnly {
            self.enter_hybrid()?;
        }

        let state = self.index.read();
        if let Some(cluster) = &state.cluster {
            if let Some(result) = cluster.try_read(select, where_column, &key, out) {
                return result;
            }
        }

        let matches = state.standard.lookup(where_column, &key);
        let needed = matches.len() * select.width();
        if needed > out.remaining_mut() {
            return Err(PlateError::OutputTooSmall {
                needed,
                available: out.remaining_mut(),
            });
        }

        let mut count = 0;
        for slot in matches {
            let copied = state
                .standard
                .with_record(slot, |record| out.put_slice(select.field(record)));
            if copied.is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Wait for every queued flush, then msync both tiers of every shard
    pub fn sync(&self) -> Result<()> {
        for manager in &self.managers {
            manager.wait_for_flush()?;
            manager.sync()?;
        }
        Ok(())
    }

    /// Shut down: stop the flush tasks after they drain, then msync
    pub fn close(self) -> Result<()> {
        // Writers hand their partially filled buffers back first
        drop(self.writers);
        for manager in &self.managers {
            manager.shutdown()?;
        }
        tracing::info!(shards = self.managers.len(), "Engine closed");
        Ok(())
    }

    // =========================================================================
    // Phase Handling
    // =========================================================================

    fn enter_hybrid(&self) -> Result<()> {
        self.phase
            .enter_hybrid(self.config.fence_interval(), |from| self.rebuild_index(from))
    }

    /// Rebuild the sharded Hybrid index from the log
    fn rebuild_index(&self, from: Phase) -> Result<()> {
        let mut state = self.index.write();
        let standard = IndexSet::build(
            self.config.index_shards,
            self.managers.iter().flat_map(|m| m.reader()),
        );
        let records = standard.len();
        let dropped_cluster = state.cluster.is_some();
        *state = IndexState {
            standard,
            cluster: None,
        };
        self.phase.publish_hybrid();
        drop(state);

        tracing::info!(
            from = %from,
            records,
            index_shards = self.config.index_shards,
            dropped_cluster,
            "Entered hybrid phase"
        );
        Ok(())
    }

    /// Shard identity of `ctx`, assigning one on first use
    pub fn must_assign_identity(&self, ctx: &Context) -> usize {
        let identity = match ctx.identity() {
            Some(identity) => identity,
            None => {
                let identity = self.next_identity.fetch_add(1, Ordering::Relaxed);
                ctx.set_identity(identity);
                identity
            }
        };
        identity % self.writers.len()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn phase(&self) -> Phase {
        self.phase.load()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shard_count(&self) -> usize {
        self.managers.len()
    }

    pub fn stats(&self) -> EngineStats {
        let state = self.index.read();
        EngineStats {
            phase: self.phase.load(),
            indexed_records: state.standard.len(),
            flushed_per_shard: self.managers.iter().map(|m| m.flushed_count()).collect(),
            cluster_index_active: state.cluster.is_some(),
        }
    }
}
