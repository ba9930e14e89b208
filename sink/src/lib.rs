//! Materializes Singer streams into MySQL tables.
//!
//! The [`engine::Engine`] accepts SCHEMA, RECORD, ACTIVATE_VERSION and STATE messages. It keeps
//! each destination table's columns a superset of every schema seen for it, buffers records
//! into batches, writes them transactionally and only hands STATE back once everything before
//! it is committed.

pub mod batch;
pub mod checkpoint;
pub mod concurrency;
pub mod conversions;
pub mod destination;
pub mod engine;
pub mod error;
#[cfg(feature = "failpoints")]
pub mod failpoints;
mod macros;
pub mod protocol;
pub mod schema;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod version;
pub mod workers;
pub mod writer;
