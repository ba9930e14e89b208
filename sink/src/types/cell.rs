use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::mem::size_of;

use crate::types::SizeHint;

/// A single value ready to be bound into a MySQL statement.
///
/// Values are coerced into the cell variant matching their destination column before they
/// are buffered, so the writer never inspects JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Decimal(BigDecimal),
    String(String),
    /// Serialized JSON text for `JSON` columns.
    Json(String),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Instant normalized to UTC.
    Timestamp(DateTime<Utc>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Returns the version number stored in a `_sdc_table_version` cell.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::I64(value) => Some(*value),
            _ => None,
        }
    }
}

impl SizeHint for Cell {
    fn size_hint(&self) -> usize {
        let heap = match self {
            Cell::Null
            | Cell::Bool(_)
            | Cell::I64(_)
            | Cell::F64(_)
            | Cell::Date(_)
            | Cell::Time(_)
            | Cell::Timestamp(_) => 0,
            // Digits are stored as 32-bit limbs, roughly 9.6 decimal digits each.
            Cell::Decimal(value) => value.digits() as usize / 2,
            Cell::String(value) | Cell::Json(value) => value.capacity(),
        };

        size_of::<Cell>() + heap
    }
}
