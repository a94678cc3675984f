//! Record Module
//!
//! Fixed-width layout of the single table stored by PlateDB.
//!
//! ## Record Format (272 bytes, integers little-endian)
//! ```text
//! ┌──────────┬────────────────────┬────────────────────┬──────────────┐
//! │  Id (8)  │   Userid (128)     │    Name (128)      │  Salary (8)  │
//! └──────────┴────────────────────┴────────────────────┴──────────────┘
//! 0          8                    136                  264          272
//! ```
//!
//! Every 272-byte span is a valid record; there are no optional or
//! variable-length fields. String fields are zero-padded.
//!
//! ### Columns
//! - 0: Id     - unique, primary index
//! - 1: Userid - unique, unique index
//! - 2: Name   - not indexed, full scan only
//! - 3: Salary - many-to-one, secondary index

mod codec;
mod column;

pub use codec::{
    as_record_bytes, record_id, record_name, record_salary, record_user_id, FieldKey, Record,
    RecordBytes, UserKey,
};
pub use column::Column;

/// Size of one encoded record
pub const RECORD_SIZE: usize = ID_SIZE + USER_ID_SIZE + NAME_SIZE + SALARY_SIZE;

/// Width of the `id` field
pub const ID_SIZE: usize = 8;

/// Width of the `user_id` field
pub const USER_ID_SIZE: usize = 128;

/// Width of the `name` field
pub const NAME_SIZE: usize = 128;

/// Width of the `salary` field
pub const SALARY_SIZE: usize = 8;
