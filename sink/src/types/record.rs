use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A record received for a stream, positioned in the source message sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub stream: String,
    pub data: Map<String, Value>,
    /// Ordinal of the message within the run, starting at 1.
    pub position: u64,
    /// Version tag of a full-table snapshot, if the record belongs to one.
    pub version: Option<i64>,
    pub time_extracted: Option<DateTime<Utc>>,
    /// When the engine accepted the record.
    pub received_at: DateTime<Utc>,
}
