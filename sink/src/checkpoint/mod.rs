//! Acknowledged source positions per stream.

mod base;
pub mod memory;
pub mod mysql;
mod tracker;

pub use base::CheckpointStore;
pub use tracker::CheckpointTracker;
