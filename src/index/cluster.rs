//! Cluster index
//!
//! Denormalized, immutable maps for a fully loaded store that only serves
//! reads. Each map stores the answer itself rather than a slot, so the hot
//! lookups skip the record arena entirely:
//!
//! ```text
//! id      ──► user_id bytes
//! user_id ──► id
//! salary  ──► [id, id, ...]
//! ```
//!
//! Queries it cannot answer return `None` and fall back to the standard
//! index. It is discarded on the first write.

use std::collections::HashMap;

use bytes::BufMut;
use smallvec::SmallVec;

use crate::error::{PlateError, Result};
use crate::record::{record_id, record_salary, record_user_id, Column, FieldKey, UserKey};

use super::IndexSet;

#[derive(Debug, Default)]
pub struct ClusterIndex {
    user_id_by_id: HashMap<i64, UserKey>,
    id_by_user_id: HashMap<UserKey, i64>,
    ids_by_salary: HashMap<i64, SmallVec<[i64; 1]>>,
}

impl ClusterIndex {
    /// Derive the cluster maps from a built index
    pub fn build(index: &IndexSet) -> Self {
        let mut cluster = Self {
            user_id_by_id: HashMap::with_capacity(index.len()),
            id_by_user_id: HashMap::with_capacity(index.len()),
            ids_by_salary: HashMap::new(),
        };
        index.for_each_record(|record| {
            let id = record_id(record);
            let user_id = record_user_id(record);
            cluster.user_id_by_id.insert(id, *user_id);
            cluster.id_by_user_id.entry(*user_id).or_insert(id);
            cluster
                .ids_by_salary
                .entry(record_salary(record))
                .or_default()
                .push(id);
        });
        cluster
    }

    pub fn len(&self) -> usize {
        self.user_id_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user_id_by_id.is_empty()
    }

    /// Answer `select ... where column = key` from the cluster maps
    ///
    /// Covers Id and Userid selects over the Id, Userid and Salary columns,
    /// plus a Salary select by salary. Returns `None` for anything else.
    pub fn try_read<B: BufMut>(
        &self,
        select: Column,
        where_column: Column,
        key: &FieldKey,
        out: &mut B,
    ) -> Option<Result<usize>> {
        match (where_column, key, select) {
            (Column::Id, FieldKey::Integer(id), Column::Userid) => {
                let user_id = self.user_id_by_id.get(id);
                Some(emit(out, user_id.map(|u| u.as_slice())))
            }
            (Column::Id, FieldKey::Integer(id), Column::Id) => {
                let found = self.user_id_by_id.contains_key(id).then(|| id.to_le_bytes());
                Some(emit(out, found.as_ref().map(|b| b.as_slice())))
            }
            (Column::Userid, FieldKey::Text(user_id), Column::Id) => {
                let id = self.id_by_user_id.get(user_id).map(|id| id.to_le_bytes());
                Some(emit(out, id.as_ref().map(|b| b.as_slice())))
            }
            (Column::Userid, FieldKey::Text(user_id), Column::Userid) => {
                let found = self.id_by_user_id.contains_key(user_id);
                Some(emit(out, found.then_some(user_id.as_slice())))
            }
            (Column::Salary, FieldKey::Integer(salary), Column::Id | Column::Salary) => {
                let Some(ids) = self.ids_by_salary.get(salary) else {
                    return Some(Ok(0));
                };
                let width = select.width();
                let needed = ids.len() * width;
                if needed > out.remaining_mut() {
                    return Some(Err(PlateError::OutputTooSmall {
                        needed,
                        available: out.remaining_mut(),
                    }));
                }
                for id in ids {
                    match select {
                        Column::Id => out.put_slice(&id.to_le_bytes()),
                        _ => out.put_slice(&salary.to_le_bytes()),
                    }
                }
                Some(Ok(ids.len()))
            }
            _ => None,
        }
    }
}

/// Write at most one field
fn emit<B: BufMut>(out: &mut B, field: Option<&[u8]>) -> Result<usize> {
    let Some(field) = field else {
        return Ok(0);
    };
    if field.len() > out.remaining_mut() {
        return Err(PlateError::OutputTooSmall {
            needed: field.len(),
            available: out.remaining_mut(),
        });
    }
    out.put_slice(field);
    Ok(1)
}
