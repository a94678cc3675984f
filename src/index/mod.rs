//! Index Module
//!
//! In-memory lookup structures rebuilt from the log.
//!
//! ## Structure
//! ```text
//!              ┌──────────────────────── IndexSet ─────────────────────────┐
//!              │  shard 0 (RwLock)        shard 1 (RwLock)      ...        │
//!              │  ┌──────────────────┐    ┌──────────────────┐             │
//! id % N ────► │  │ records (arena)  │    │ records (arena)  │             │
//!              │  │ primary  id→off  │    │ primary  id→off  │             │
//! hash(uid) ─► │  │ unique  uid→slot │    │ unique  uid→slot │             │
//! hash(sal) ─► │  │ secondary sal→[] │    │ secondary sal→[] │             │
//!              │  └──────────────────┘    └──────────────────┘             │
//!              └───────────────────────────────────────────────────────────┘
//! ```
//!
//! A record lives in the arena of the shard its id routes to. The unique and
//! secondary maps may sit in other shards and point back with a `SlotRef`.
//! No operation holds two shard locks at once.
//!
//! A single shard is the coarse mode used for the consolidated read-only
//! index.

mod cluster;
mod shard;

pub use cluster::ClusterIndex;
pub use shard::{IndexShard, SlotList, SlotRef};

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::CachePadded;
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::record::{record_id, record_salary, record_user_id, Column, FieldKey, RecordBytes, UserKey};

/// Slots matched by one lookup
pub type Matches = SmallVec<[SlotRef; 4]>;

/// Primary, unique and secondary indexes over every appended record
pub struct IndexSet {
    shards: Vec<CachePadded<RwLock<IndexShard>>>,
    len: AtomicUsize,
}

impl IndexSet {
    /// An empty index with `shard_count` partitions (at least one)
    pub fn new(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| CachePadded::new(RwLock::new(IndexShard::new())))
            .collect();
        Self {
            shards,
            len: AtomicUsize::new(0),
        }
    }

    /// Build an index from a replay of the log
    pub fn build(shard_count: usize, records: impl IntoIterator<Item = RecordBytes>) -> Self {
        let index = Self::new(shard_count);
        for record in records {
            index.insert(&record);
        }
        index
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Number of indexed records
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // Routing
    // =========================================================================

    fn primary_shard(&self, id: i64) -> usize {
        id.rem_euclid(self.shards.len() as i64) as usize
    }

    fn unique_shard(&self, user_id: &UserKey) -> usize {
        crc32fast::hash(user_id) as usize % self.shards.len()
    }

    fn secondary_shard(&self, salary: i64) -> usize {
        crc32fast::hash(&salary.to_le_bytes()) as usize % self.shards.len()
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Insert a record into all three indexes
    ///
    /// Returns `false` if a record with the same id is already indexed; the
    /// first one inserted wins and the duplicate is not stored. When built
    /// from the log that is replay order, not arrival order.
    pub fn insert(&self, record: &RecordBytes) -> bool {
        let id = record_id(record);
        let shard = self.primary_shard(id);
        let Some(offset) = self.shards[shard].write().insert_primary(id, record) else {
            tracing::warn!(id, "Duplicate id, record left unindexed");
            return false;
        };
        let slot = SlotRef {
            shard: shard as u32,
            offset,
        };

        let user_id = record_user_id(record);
        if !self.shards[self.unique_shard(user_id)]
            .write()
            .insert_unique(user_id, slot)
        {
            tracing::warn!(id, "Duplicate user id, keeping the earlier mapping");
        }

        let salary = record_salary(record);
        self.shards[self.secondary_shard(salary)]
            .write()
            .insert_secondary(salary, slot);

        self.len.fetch_add(1, Ordering::AcqRel);
        true
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Slots of every record whose `column` equals `key`
    ///
    /// Name has no index and is answered by a full scan.
    pub fn lookup(&self, column: Column, key: &FieldKey) -> Matches {
        let mut matches = Matches::new();
        match (column, key) {
            (Column::Id, FieldKey::Integer(id)) => {
                let shard = self.primary_shard(*id);
                if let Some(&offset) = self.shards[shard].read().primary.get(id) {
                    matches.push(SlotRef {
                        shard: shard as u32,
                        offset,
                    });
                }
            }
            (Column::Userid, FieldKey::Text(user_id)) => {
                let shard = self.shards[self.unique_shard(user_id)].read();
                matches.extend(shard.unique.get(user_id).copied());
            }
            (Column::Salary, FieldKey::Integer(salary)) => {
                let shard = self.shards[self.secondary_shard(*salary)].read();
                if let Some(slots) = shard.secondary.get(salary) {
                    matches.extend(slots.iter().copied());
                }
            }
            (Column::Name, FieldKey::Text(_)) => {
                for (index, shard) in self.shards.iter().enumerate() {
                    let shard = shard.read();
                    for (offset, record) in shard.records.iter().enumerate() {
                        if key.matches(Column::Name, record) {
                            matches.push(SlotRef {
                                shard: index as u32,
                                offset: offset as u32,
                            });
                        }
                    }
                }
            }
            _ => {}
        }
        matches
    }

    /// Run `f` on the record at `slot`
    pub fn with_record<R>(&self, slot: SlotRef, f: impl FnOnce(&RecordBytes) -> R) -> Option<R> {
        let shard = self.shards.get(slot.shard as usize)?.read();
        shard.record(slot.offset).map(f)
    }

    /// Visit every indexed record, shard by shard
    pub fn for_each_record(&self, mut f: impl FnMut(&RecordBytes)) {
        for shard in &self.shards {
            for record in shard.read().records() {
                f(record);
            }
        }
    }
}
