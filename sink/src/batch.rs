//! Per-stream buffering of rows waiting to be flushed.

use std::time::{Duration, Instant};

use config::shared::BatchConfig;

use crate::types::{SizeHint, TableRow};

/// Rows drained from a [`RecordBatcher`], in arrival order.
#[derive(Debug, Clone)]
pub struct Batch {
    pub stream: String,
    pub rows: Vec<TableRow>,
    /// Accumulated size hint of `rows`.
    pub bytes: usize,
    /// When the first row of the batch was accepted.
    pub started: Instant,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_position(&self) -> Option<u64> {
        self.rows.first().map(TableRow::position)
    }

    pub fn last_position(&self) -> Option<u64> {
        self.rows.last().map(TableRow::position)
    }

    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Accumulates the rows of one stream until a size or age threshold is reached.
#[derive(Debug)]
pub struct RecordBatcher {
    stream: String,
    max_rows: usize,
    max_bytes: usize,
    max_fill: Option<Duration>,
    rows: Vec<TableRow>,
    bytes: usize,
    started: Option<Instant>,
}

impl RecordBatcher {
    pub fn new(stream: impl Into<String>, config: &BatchConfig) -> RecordBatcher {
        RecordBatcher {
            stream: stream.into(),
            max_rows: config.max_rows,
            max_bytes: config.max_bytes,
            max_fill: config.max_fill(),
            rows: Vec::new(),
            bytes: 0,
            started: None,
        }
    }

    /// Buffers a row. Rows must be accepted in position order.
    pub fn accept(&mut self, row: TableRow) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }

        self.bytes = self.bytes.saturating_add(row.size_hint());
        self.rows.push(row);
    }

    /// Returns `true` once the buffer reached its row count, byte size or age threshold.
    pub fn should_flush(&self) -> bool {
        if self.rows.is_empty() {
            return false;
        }

        if self.rows.len() >= self.max_rows || self.bytes >= self.max_bytes {
            return true;
        }

        match (self.max_fill, self.started) {
            (Some(max_fill), Some(started)) => started.elapsed() >= max_fill,
            _ => false,
        }
    }

    /// Takes every buffered row, leaving the batcher empty.
    pub fn drain(&mut self) -> Batch {
        let rows = std::mem::take(&mut self.rows);
        let bytes = std::mem::take(&mut self.bytes);
        let started = self.started.take().unwrap_or_else(Instant::now);

        Batch {
            stream: self.stream.clone(),
            rows,
            bytes,
            started,
        }
    }

    /// Drops every buffered row, returning how many were discarded.
    pub fn discard(&mut self) -> usize {
        let discarded = self.rows.len();
        self.drain();
        discarded
    }

    /// Position of the oldest buffered row.
    pub fn oldest_position(&self) -> Option<u64> {
        self.rows.first().map(TableRow::position)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}
