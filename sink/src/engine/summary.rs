use serde_json::Value;

use crate::engine::StreamStats;
use crate::error::{ErrorKind, SinkError, SinkResult};
use crate::sink_error;
use crate::types::TableName;

/// Why a stream stopped.
#[derive(Debug, Clone)]
pub struct StreamFailure {
    /// Operation that failed, e.g. `flush` or `apply schema`.
    pub operation: &'static str,
    pub error: SinkError,
    /// Position of the first record of the stream that was not committed.
    pub lost_from: u64,
}

/// Outcome of one stream.
#[derive(Debug, Clone)]
pub struct StreamReport {
    pub stream: String,
    pub table: Option<TableName>,
    pub stats: StreamStats,
    pub failure: Option<StreamFailure>,
}

impl StreamReport {
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Reports ordered by stream name.
    pub streams: Vec<StreamReport>,
    /// STATE token acknowledged while finishing, if any.
    pub final_state: Option<Value>,
    /// The run was shut down before its input ended. Buffered rows were discarded.
    pub interrupted: bool,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        !self.interrupted && self.streams.iter().all(|report| !report.is_failed())
    }

    pub fn stream(&self, stream: &str) -> Option<&StreamReport> {
        self.streams.iter().find(|report| report.stream == stream)
    }

    pub fn failed_streams(&self) -> impl Iterator<Item = &StreamReport> {
        self.streams.iter().filter(|report| report.is_failed())
    }

    /// Returns the summary, or every stream failure aggregated into one error.
    pub fn into_result(self) -> SinkResult<RunSummary> {
        let errors: Vec<SinkError> = self
            .failed_streams()
            .filter_map(|report| {
                let failure = report.failure.as_ref()?;
                Some(stream_error(&report.stream, failure))
            })
            .collect();

        if errors.is_empty() {
            Ok(self)
        } else {
            Err(errors.into())
        }
    }
}

/// Error naming the failed stream, the operation and the cause.
pub(crate) fn stream_error(stream: &str, failure: &StreamFailure) -> SinkError {
    let cause = match failure.error.detail() {
        Some(detail) => format!("{} ({detail})", failure.error.description()),
        None => failure.error.description().to_string(),
    };

    sink_error!(
        ErrorKind::StreamFailed,
        "Stream failed",
        format!("stream `{stream}` failed during {}: {cause}", failure.operation),
        source: failure.error.clone()
    )
}
