//! Destinations rows are materialized into.
//!
//! The [`Destination`] trait is what the engine and writer talk to. [`mysql::MySqlDestination`]
//! loads into a MySQL server and [`memory::MemoryDestination`] keeps everything in memory for
//! tests, with fault injection.

mod base;
pub mod memory;
pub mod mysql;
pub mod sql;

pub use base::{DeleteMode, Destination, WriteMode, batch_columns};
