use std::collections::HashMap;
use std::future::Future;

use crate::error::SinkResult;

/// Persistent, append-only log of committed positions.
///
/// Implementations never remove entries. The position of a stream is the highest one ever
/// appended for it.
pub trait CheckpointStore {
    /// Loads the highest position recorded for every stream.
    fn load(&self) -> impl Future<Output = SinkResult<HashMap<String, u64>>> + Send;

    /// Appends a committed position for `stream`.
    fn append(&self, stream: &str, position: u64) -> impl Future<Output = SinkResult<()>> + Send;
}
