//! Transactional flushing of batches with retries.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use config::shared::RetryConfig;
use rand::Rng;
use tracing::{debug, warn};

use crate::batch::Batch;
use crate::destination::{Destination, WriteMode};
use crate::error::{ErrorKind, SinkResult};
#[cfg(feature = "failpoints")]
use crate::failpoints::{WRITER_BEFORE_WRITE, sink_fail_point};
use crate::schema::metadata::BATCHED_AT;
use crate::sink_error;
use crate::types::{Cell, DestinationTable};
use crate::workers::policy::build_error_handling_policy;

/// Largest random share added to a backoff delay.
const MAX_JITTER_FACTOR: f64 = 0.3;

/// Outcome of a committed flush.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CommitResult {
    pub rows: u64,
    /// Attempts it took, including the successful one.
    pub attempts: u32,
    pub first_position: u64,
    pub last_position: u64,
}

/// Returns the delay before retry number `attempt`, starting at 1.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    let base_delay_ms = config.initial_retry_delay_ms as f64 * config.backoff_multiplier.powi(exponent);
    let capped_delay_ms = base_delay_ms.min(config.max_retry_delay_ms as f64);

    let jitter_factor = rand::thread_rng().r#gen::<f64>() * MAX_JITTER_FACTOR;

    Duration::from_millis((capped_delay_ms * (1.0 + jitter_factor)) as u64)
}

/// Runs `operation` until it succeeds, fails with a non-transient error or runs out of
/// attempts.
///
/// Every attempt is bounded by the configured operation timeout, whose expiry counts as a
/// transient failure. Exhausting the attempts yields [`ErrorKind::FatalWriteError`] carrying
/// the last error. Returns the value together with the number of attempts made.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    stream: &str,
    operation: &'static str,
    mut attempt_fn: F,
) -> SinkResult<(T, u32)>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = SinkResult<T>>,
{
    let mut attempt = 1;

    loop {
        let result = match tokio::time::timeout(config.operation_timeout(), attempt_fn(attempt)).await
        {
            Ok(result) => result,
            Err(_) => Err(sink_error!(
                ErrorKind::DestinationTimeout,
                "Destination operation timed out",
                format!("{operation} exceeded {}ms", config.operation_timeout_ms)
            )),
        };

        let err = match result {
            Ok(value) => return Ok((value, attempt)),
            Err(err) => err,
        };

        if !build_error_handling_policy(&err).is_transient() {
            return Err(err);
        }

        if attempt >= config.max_attempts {
            return Err(sink_error!(
                ErrorKind::FatalWriteError,
                "Retries exhausted",
                format!("{operation} for stream `{stream}` failed after {attempt} attempts"),
                source: err
            ));
        }

        let delay = backoff_delay(config, attempt);
        warn!(
            stream,
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient destination failure, retrying"
        );

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Writes batches into their table, upserting on the stream's keys or appending.
#[derive(Debug, Clone)]
pub struct Writer<D> {
    destination: D,
    retry: RetryConfig,
}

impl<D> Writer<D>
where
    D: Destination,
{
    pub fn new(destination: D, retry: RetryConfig) -> Self {
        Self { destination, retry }
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Flushes `batch` into `table` in one transaction per attempt.
    ///
    /// Rows are stamped with the flush time when the table has a `_sdc_batched_at` column.
    pub async fn flush(
        &self,
        table: &DestinationTable,
        mut batch: Batch,
        keys: &[String],
    ) -> SinkResult<CommitResult> {
        let (Some(first_position), Some(last_position)) =
            (batch.first_position(), batch.last_position())
        else {
            return Ok(CommitResult {
                rows: 0,
                attempts: 0,
                first_position: 0,
                last_position: 0,
            });
        };

        if table.has_column(BATCHED_AT) {
            let batched_at = Utc::now();
            for row in &mut batch.rows {
                row.set(BATCHED_AT, Cell::Timestamp(batched_at));
            }
        }

        let mode = WriteMode::from_keys(keys);
        let rows = &batch.rows;

        let (written, attempts) = with_retry(&self.retry, &batch.stream, "write batch", |attempt| {
            let mode = &mode;
            async move {
                debug!(table = %table.name, rows = rows.len(), attempt, "writing batch");

                #[cfg(feature = "failpoints")]
                sink_fail_point(WRITER_BEFORE_WRITE)?;

                self.destination.write_batch(table, rows, mode).await
            }
        })
        .await?;

        Ok(CommitResult {
            rows: written,
            attempts,
            first_position,
            last_position,
        })
    }
}
