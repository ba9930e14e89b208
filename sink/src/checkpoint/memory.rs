use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::checkpoint::CheckpointStore;
use crate::error::SinkResult;

/// Checkpoint store keeping its log in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    log: Arc<Mutex<Vec<(String, u64)>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every appended entry, in append order.
    pub async fn history(&self) -> Vec<(String, u64)> {
        self.log.lock().await.clone()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> SinkResult<HashMap<String, u64>> {
        let log = self.log.lock().await;

        let mut positions: HashMap<String, u64> = HashMap::new();
        for (stream, position) in log.iter() {
            let entry = positions.entry(stream.clone()).or_default();
            *entry = (*entry).max(*position);
        }

        Ok(positions)
    }

    async fn append(&self, stream: &str, position: u64) -> SinkResult<()> {
        self.log.lock().await.push((stream.to_string(), position));

        Ok(())
    }
}
