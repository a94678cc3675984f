//! Column definitions
//!
//! Offset/width table for the four fixed columns.

use crate::error::PlateError;

use super::{RecordBytes, ID_SIZE, NAME_SIZE, SALARY_SIZE, USER_ID_SIZE};

/// Column identifiers, numbered as on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Column {
    Id = 0,
    Userid = 1,
    Name = 2,
    Salary = 3,
}

impl Column {
    /// All columns in layout order
    pub const ALL: [Column; 4] = [Column::Id, Column::Userid, Column::Name, Column::Salary];

    /// Byte width of the column inside a record
    pub const fn width(self) -> usize {
        match self {
            Column::Id => ID_SIZE,
            Column::Userid => USER_ID_SIZE,
            Column::Name => NAME_SIZE,
            Column::Salary => SALARY_SIZE,
        }
    }

    /// Byte offset of the column inside a record
    pub const fn offset(self) -> usize {
        match self {
            Column::Id => 0,
            Column::Userid => ID_SIZE,
            Column::Name => ID_SIZE + USER_ID_SIZE,
            Column::Salary => ID_SIZE + USER_ID_SIZE + NAME_SIZE,
        }
    }

    /// Whether the column holds a little-endian i64
    pub const fn is_integer(self) -> bool {
        matches!(self, Column::Id | Column::Salary)
    }

    /// The column's bytes inside an encoded record
    pub fn field(self, record: &RecordBytes) -> &[u8] {
        &record[self.offset()..self.offset() + self.width()]
    }
}

impl TryFrom<i32> for Column {
    type Error = PlateError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Column::Id),
            1 => Ok(Column::Userid),
            2 => Ok(Column::Name),
            3 => Ok(Column::Salary),
            other => Err(PlateError::InvalidColumn(other)),
        }
    }
}
