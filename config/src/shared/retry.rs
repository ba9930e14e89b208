use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Retry behavior for transient destination write failures.
///
/// A flush that hits a lock wait timeout, a deadlock or a dropped connection is retried as a
/// whole with exponential backoff. Delays are specified in milliseconds for serialization
/// compatibility.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per flush, including the first one.
    ///
    /// Default: 5
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry.
    ///
    /// Default: 50ms
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,

    /// Upper bound for the delay between attempts.
    ///
    /// Default: 2000ms
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Multiplier applied to the delay after each failed attempt. Must be >= 1.0.
    ///
    /// Default: 2.0
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Timeout for a single destination operation. Expiry counts as a transient failure.
    ///
    /// Default: 60000ms
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_retry_delay_ms() -> u64 {
    50
}

fn default_max_retry_delay_ms() -> u64 {
    2000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_operation_timeout_ms() -> u64 {
    60000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

impl RetryConfig {
    /// Returns the initial retry delay as a Duration.
    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_millis(self.initial_retry_delay_ms)
    }

    /// Returns the maximum retry delay as a Duration.
    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    /// Returns the per-operation timeout as a Duration.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "retry.max_attempts".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.backoff_multiplier < 1.0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "retry.backoff_multiplier".to_string(),
                constraint: "must be greater than or equal to 1.0".to_string(),
            });
        }

        if self.max_retry_delay_ms < self.initial_retry_delay_ms {
            return Err(ValidationError::InvalidFieldValue {
                field: "retry.max_retry_delay_ms".to_string(),
                constraint: "must not be lower than `retry.initial_retry_delay_ms`".to_string(),
            });
        }

        Ok(())
    }
}
