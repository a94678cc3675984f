//! Index shard
//!
//! One independently lockable partition of the index set. Owns an arena of
//! records plus the three lookup maps for keys routed to it.

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::record::{RecordBytes, UserKey};

/// Location of a record: the arena it lives in and its position there
///
/// Assigned once at insert time and never reused or moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRef {
    pub shard: u32,
    pub offset: u32,
}

/// Slots sharing one salary; singleton groups stay inline
pub type SlotList = SmallVec<[SlotRef; 1]>;

#[derive(Debug, Default)]
pub struct IndexShard {
    /// Records whose id routes to this shard
    pub(super) records: Vec<RecordBytes>,
    /// id -> offset into `records`
    pub(super) primary: HashMap<i64, u32>,
    /// user_id -> slot
    pub(super) unique: HashMap<UserKey, SlotRef>,
    /// salary -> slots
    pub(super) secondary: HashMap<i64, SlotList>,
}

impl IndexShard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record under its id; `None` if the id is already present
    pub(super) fn insert_primary(&mut self, id: i64, record: &RecordBytes) -> Option<u32> {
        if self.primary.contains_key(&id) {
            return None;
        }
        let offset = self.records.len() as u32;
        self.records.push(*record);
        self.primary.insert(id, offset);
        Some(offset)
    }

    /// Map a user id to a slot; `false` if the user id is already taken
    pub(super) fn insert_unique(&mut self, user_id: &UserKey, slot: SlotRef) -> bool {
        match self.unique.entry(*user_id) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(slot);
                true
            }
        }
    }

    pub(super) fn insert_secondary(&mut self, salary: i64, slot: SlotRef) {
        self.secondary.entry(salary).or_default().push(slot);
    }

    pub fn record(&self, offset: u32) -> Option<&RecordBytes> {
        self.records.get(offset as usize)
    }

    pub fn records(&self) -> &[RecordBytes] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
