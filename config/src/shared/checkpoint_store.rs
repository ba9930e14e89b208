use serde::{Deserialize, Serialize};

/// Where acknowledged checkpoints are persisted.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStoreConfig {
    /// Checkpoints only live for the duration of the run.
    Memory,

    /// Checkpoints are appended to `_sdc_checkpoints` in the destination database.
    #[default]
    Destination,
}
