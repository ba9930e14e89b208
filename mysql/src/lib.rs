//! MySQL connection and catalog utilities for the loader crates.
//!
//! Builds [`sqlx`] connect options from the target configuration, quotes identifiers, reads
//! table definitions from `information_schema` and classifies server error numbers.

pub mod codes;
pub mod connect;
pub mod schema;
#[cfg(feature = "test-utils")]
pub mod test_utils;
pub mod types;
pub mod version;
