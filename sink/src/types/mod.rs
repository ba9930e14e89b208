//! Core data types of the sink.
//!
//! Stream-side types ([`StreamSchema`], [`FieldSchema`], [`Record`]) describe what the source
//! declares and sends. Destination-side types ([`DestinationTable`], [`SqlType`], [`TableRow`],
//! [`Cell`]) describe what ends up in MySQL.

mod cell;
mod field;
mod record;
mod sized;
mod table;
mod table_row;

pub use cell::*;
pub use field::*;
pub use record::*;
pub use sized::*;
pub use table::*;
pub use table_row::*;

pub use mysql::types::TableName;
