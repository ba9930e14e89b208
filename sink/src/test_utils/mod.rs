//! Helpers shared by unit and integration tests.
//!
//! - [`fixtures`] builds configurations and messages.
//! - [`failpoints`] configures failpoints for the duration of a test.

#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod fixtures;
