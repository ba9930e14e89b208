//! Tracing setup shared by the loader binary and the test suites.

mod tracing;

pub use crate::tracing::{LogFlusher, TracingError, init_test_tracing, init_tracing};
