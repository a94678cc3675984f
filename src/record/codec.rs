//! Record codec
//!
//! Encoding and decoding between the typed [`Record`] and its 272-byte form,
//! plus accessors that read single fields straight out of encoded bytes.

use std::fmt;

use crate::error::{PlateError, Result};

use super::{Column, ID_SIZE, NAME_SIZE, RECORD_SIZE, SALARY_SIZE, USER_ID_SIZE};

/// One encoded record
pub type RecordBytes = [u8; RECORD_SIZE];

/// Zero-padded `user_id` field, the unique index key
pub type UserKey = [u8; USER_ID_SIZE];

/// Decoded record
#[derive(Clone, PartialEq, Eq)]
pub struct Record {
    pub id: i64,
    pub user_id: [u8; USER_ID_SIZE],
    pub name: [u8; NAME_SIZE],
    pub salary: i64,
}

impl Record {
    /// Build a record, zero-padding (or truncating) the string fields
    pub fn new(id: i64, user_id: impl AsRef<[u8]>, name: impl AsRef<[u8]>, salary: i64) -> Self {
        Self {
            id,
            user_id: pad(user_id.as_ref()),
            name: pad(name.as_ref()),
            salary,
        }
    }

    /// Encode to the fixed 272-byte layout
    pub fn encode(&self) -> RecordBytes {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[Column::Id.offset()..Column::Id.offset() + ID_SIZE]
            .copy_from_slice(&self.id.to_le_bytes());
        bytes[Column::Userid.offset()..Column::Userid.offset() + USER_ID_SIZE]
            .copy_from_slice(&self.user_id);
        bytes[Column::Name.offset()..Column::Name.offset() + NAME_SIZE]
            .copy_from_slice(&self.name);
        bytes[Column::Salary.offset()..Column::Salary.offset() + SALARY_SIZE]
            .copy_from_slice(&self.salary.to_le_bytes());
        bytes
    }

    /// Decode from the fixed 272-byte layout
    pub fn decode(bytes: &RecordBytes) -> Self {
        Self {
            id: record_id(bytes),
            user_id: *record_user_id(bytes),
            name: *record_name(bytes),
            salary: record_salary(bytes),
        }
    }

    /// Decode from an unsized slice, checking its length
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self::decode(as_record_bytes(bytes)?))
    }

    /// `user_id` without its zero padding
    pub fn user_id_trimmed(&self) -> &[u8] {
        trim(&self.user_id)
    }

    /// `name` without its zero padding
    pub fn name_trimmed(&self) -> &[u8] {
        trim(&self.name)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("user_id", &String::from_utf8_lossy(self.user_id_trimmed()))
            .field("name", &String::from_utf8_lossy(self.name_trimmed()))
            .field("salary", &self.salary)
            .finish()
    }
}

/// View a payload as one encoded record
pub fn as_record_bytes(bytes: &[u8]) -> Result<&RecordBytes> {
    bytes
        .try_into()
        .map_err(|_| PlateError::InvalidRecordLength {
            expected: RECORD_SIZE,
            actual: bytes.len(),
        })
}

pub fn record_id(bytes: &RecordBytes) -> i64 {
    read_i64(bytes, Column::Id.offset())
}

pub fn record_salary(bytes: &RecordBytes) -> i64 {
    read_i64(bytes, Column::Salary.offset())
}

pub fn record_user_id(bytes: &RecordBytes) -> &UserKey {
    let start = Column::Userid.offset();
    bytes[start..start + USER_ID_SIZE]
        .try_into()
        .expect("user_id field is exactly USER_ID_SIZE bytes")
}

pub fn record_name(bytes: &RecordBytes) -> &[u8; NAME_SIZE] {
    let start = Column::Name.offset();
    bytes[start..start + NAME_SIZE]
        .try_into()
        .expect("name field is exactly NAME_SIZE bytes")
}

fn read_i64(bytes: &RecordBytes, offset: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    i64::from_le_bytes(raw)
}

fn pad<const N: usize>(value: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let len = value.len().min(N);
    out[..len].copy_from_slice(&value[..len]);
    out
}

fn trim(value: &[u8]) -> &[u8] {
    let end = value.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &value[..end]
}

// =============================================================================
// Lookup Keys
// =============================================================================

/// A normalized `where` key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKey {
    /// Id or Salary
    Integer(i64),
    /// Userid or Name, zero-padded to 128 bytes
    Text([u8; USER_ID_SIZE]),
}

impl FieldKey {
    /// Normalize raw key bytes for `column`
    ///
    /// Integer columns need exactly 8 bytes. Text keys may be shorter than
    /// the column and are zero-padded, matching how the field is stored.
    pub fn parse(column: Column, key: &[u8]) -> Result<Self> {
        let width = column.width();
        if column.is_integer() {
            let raw: [u8; 8] = key.try_into().map_err(|_| PlateError::InvalidKeyLength {
                column,
                width,
                actual: key.len(),
            })?;
            return Ok(FieldKey::Integer(i64::from_le_bytes(raw)));
        }
        if key.len() > width {
            return Err(PlateError::InvalidKeyLength {
                column,
                width,
                actual: key.len(),
            });
        }
        Ok(FieldKey::Text(pad(key)))
    }

    /// Whether the `column` field of `record` equals this key
    pub fn matches(&self, column: Column, record: &RecordBytes) -> bool {
        match self {
            FieldKey::Integer(value) => read_i64(record, column.offset()) == *value,
            FieldKey::Text(value) => column.field(record) == value.as_slice(),
        }
    }
}
