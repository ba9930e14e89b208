use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{
    BatchConfig, CheckpointStoreConfig, MySqlConnectionConfig, RetryConfig, ValidationError,
};

/// How JSON schema `number` fields are stored.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberMode {
    /// Fixed precision `DECIMAL(precision, scale)`.
    #[default]
    Decimal,
    /// Floating point `DOUBLE`.
    Double,
}

/// Fully resolved configuration of the MySQL target.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    #[serde(flatten)]
    pub connection: MySqlConnectionConfig,
    /// Schema (database) tables are created in. Falls back to the stream name prefix and then
    /// to the connection database.
    #[serde(default)]
    pub default_target_schema: Option<String>,
    /// Delete stale rows on version activation instead of marking them.
    #[serde(default)]
    pub hard_delete: bool,
    /// Write the `_sdc_extracted_at`, `_sdc_received_at`, `_sdc_batched_at` and `_sdc_sequence`
    /// columns.
    #[serde(default = "default_add_record_metadata")]
    pub add_record_metadata: bool,
    /// Size of string columns without a declared `maxLength`.
    #[serde(default = "default_max_varchar_size")]
    pub max_varchar_size: u32,
    #[serde(default)]
    pub flattening_enabled: bool,
    #[serde(default)]
    pub flattening_max_depth: usize,
    #[serde(default)]
    pub number_mode: NumberMode,
    #[serde(default = "default_decimal_precision")]
    pub decimal_precision: u8,
    #[serde(default = "default_decimal_scale")]
    pub decimal_scale: u8,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Number of tables that may flush concurrently.
    #[serde(default = "default_max_concurrent_flushes")]
    pub max_concurrent_flushes: usize,
    /// Abort the whole run as soon as one stream fails.
    #[serde(default)]
    pub fail_fast: bool,
    /// Skip records at or below the checkpoint persisted by a previous run.
    #[serde(default)]
    pub resume_from_checkpoint: bool,
    #[serde(default)]
    pub checkpoint_store: CheckpointStoreConfig,
}

impl TargetConfig {
    pub const DEFAULT_MAX_VARCHAR_SIZE: u32 = 255;

    pub const DEFAULT_DECIMAL_PRECISION: u8 = 38;

    pub const DEFAULT_DECIMAL_SCALE: u8 = 18;

    pub const DEFAULT_MAX_CONCURRENT_FLUSHES: usize = 4;

    /// Largest precision MySQL accepts for `DECIMAL`.
    pub const MAX_DECIMAL_PRECISION: u8 = 65;

    /// Largest scale MySQL accepts for `DECIMAL`.
    pub const MAX_DECIMAL_SCALE: u8 = 30;

    /// Validates the whole configuration tree.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.connection.validate()?;
        self.batch.validate()?;
        self.retry.validate()?;

        if self.max_varchar_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "max_varchar_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.flattening_enabled && self.flattening_max_depth == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "flattening_max_depth".to_string(),
                constraint: "must be greater than 0 when flattening is enabled".to_string(),
            });
        }

        if self.decimal_precision == 0 || self.decimal_precision > Self::MAX_DECIMAL_PRECISION {
            return Err(ValidationError::InvalidFieldValue {
                field: "decimal_precision".to_string(),
                constraint: format!("must be between 1 and {}", Self::MAX_DECIMAL_PRECISION),
            });
        }

        if self.decimal_scale > Self::MAX_DECIMAL_SCALE || self.decimal_scale > self.decimal_precision
        {
            return Err(ValidationError::InvalidFieldValue {
                field: "decimal_scale".to_string(),
                constraint: format!(
                    "must not exceed {} nor `decimal_precision`",
                    Self::MAX_DECIMAL_SCALE
                ),
            });
        }

        if self.resume_from_checkpoint && self.checkpoint_store == CheckpointStoreConfig::Memory {
            return Err(ValidationError::InvalidFieldValue {
                field: "resume_from_checkpoint".to_string(),
                constraint: "requires a persistent `checkpoint_store`".to_string(),
            });
        }

        if self.max_concurrent_flushes == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "max_concurrent_flushes".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Effective flattening depth, zero when flattening is disabled.
    pub fn flattening_depth(&self) -> usize {
        if self.flattening_enabled {
            self.flattening_max_depth
        } else {
            0
        }
    }
}

impl Config for TargetConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

fn default_add_record_metadata() -> bool {
    true
}

fn default_max_varchar_size() -> u32 {
    TargetConfig::DEFAULT_MAX_VARCHAR_SIZE
}

fn default_decimal_precision() -> u8 {
    TargetConfig::DEFAULT_DECIMAL_PRECISION
}

fn default_decimal_scale() -> u8 {
    TargetConfig::DEFAULT_DECIMAL_SCALE
}

fn default_max_concurrent_flushes() -> usize {
    TargetConfig::DEFAULT_MAX_CONCURRENT_FLUSHES
}
