use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::checkpoint::CheckpointStore;
use crate::error::SinkResult;

/// Tracks the last committed source position of every stream.
///
/// Positions only move forward. Advancing to a position at or below the current one is
/// ignored, so flushes of one stream may report out of order without regressing it.
#[derive(Debug, Clone)]
pub struct CheckpointTracker<S> {
    store: S,
    positions: Arc<Mutex<HashMap<String, u64>>>,
}

impl<S> CheckpointTracker<S>
where
    S: CheckpointStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            positions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Seeds the tracker with the positions persisted by previous runs.
    pub async fn load(&self) -> SinkResult<usize> {
        let loaded = self.store.load().await?;
        let count = loaded.len();

        let mut positions = self.positions.lock().await;
        for (stream, position) in loaded {
            let entry = positions.entry(stream).or_default();
            *entry = (*entry).max(position);
        }

        info!(streams = count, "loaded checkpoints");

        Ok(count)
    }

    /// Records that every record of `stream` up to `position` is committed.
    ///
    /// Returns `false` when the position did not move forward.
    pub async fn advance(&self, stream: &str, position: u64) -> SinkResult<bool> {
        let mut positions = self.positions.lock().await;

        if positions.get(stream).is_some_and(|current| *current >= position) {
            debug!(stream, position, "ignoring checkpoint regression");
            return Ok(false);
        }

        self.store.append(stream, position).await?;
        positions.insert(stream.to_string(), position);

        debug!(stream, position, "advanced checkpoint");

        Ok(true)
    }

    pub async fn last_position(&self, stream: &str) -> Option<u64> {
        self.positions.lock().await.get(stream).copied()
    }

    pub async fn positions(&self) -> HashMap<String, u64> {
        self.positions.lock().await.clone()
    }
}
