use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Thresholds deciding when a stream's buffered rows are flushed.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Maximum number of rows buffered per table before a flush.
    #[serde(default = "default_batch_max_rows")]
    pub max_rows: usize,
    /// Maximum approximate size in bytes buffered per table before a flush.
    #[serde(default = "default_batch_max_bytes")]
    pub max_bytes: usize,
    /// Maximum age, in milliseconds, of the oldest buffered row before a flush. Zero disables it.
    #[serde(default = "default_batch_max_fill_ms")]
    pub max_fill_ms: u64,
}

impl BatchConfig {
    pub const DEFAULT_MAX_ROWS: usize = 10000;

    pub const DEFAULT_MAX_BYTES: usize = 8 * 1024 * 1024;

    pub const DEFAULT_MAX_FILL_MS: u64 = 0;

    /// Validates batch configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_rows == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "batch.max_rows".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.max_bytes == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "batch.max_bytes".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Returns the maximum fill time, or `None` when age based flushing is disabled.
    pub fn max_fill(&self) -> Option<Duration> {
        (self.max_fill_ms > 0).then(|| Duration::from_millis(self.max_fill_ms))
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_rows: default_batch_max_rows(),
            max_bytes: default_batch_max_bytes(),
            max_fill_ms: default_batch_max_fill_ms(),
        }
    }
}

fn default_batch_max_rows() -> usize {
    BatchConfig::DEFAULT_MAX_ROWS
}

fn default_batch_max_bytes() -> usize {
    BatchConfig::DEFAULT_MAX_BYTES
}

fn default_batch_max_fill_ms() -> u64 {
    BatchConfig::DEFAULT_MAX_FILL_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rows_is_rejected() {
        let config = BatchConfig {
            max_rows: 0,
            ..BatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_fill_disables_age_trigger() {
        assert_eq!(BatchConfig::default().max_fill(), None);
        let config = BatchConfig {
            max_fill_ms: 250,
            ..BatchConfig::default()
        };
        assert_eq!(config.max_fill(), Some(Duration::from_millis(250)));
    }
}
