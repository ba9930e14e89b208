//! The message acceptor driving every component.
//!
//! [`Engine`] consumes messages in order. Schema messages are reconciled against the
//! destination before any row of the new shape is buffered, records are coerced and batched
//! per stream, full batches are flushed on the worker pool and STATE tokens are handed back
//! once every record before them is committed.

mod acceptor;
mod context;
mod summary;

pub use acceptor::Engine;
pub use context::{StreamContext, StreamStats, TableFailure, TableState};
pub use summary::{RunSummary, StreamFailure, StreamReport};
