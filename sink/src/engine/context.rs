use std::collections::HashMap;

use crate::batch::RecordBatcher;
use crate::error::SinkError;
use crate::schema::StreamShape;
use crate::types::{DestinationTable, SqlType, StreamSchema, TableName};
use crate::version::VersionState;

/// Counters reported per stream at the end of a run.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct StreamStats {
    /// Records accepted into the buffer.
    pub received: u64,
    /// Rows committed to the destination.
    pub written: u64,
    /// Records skipped because they could not be converted.
    pub malformed: u64,
    /// Records at or below the resumed checkpoint.
    pub resumed: u64,
    /// Records dropped after the stream failed.
    pub dropped: u64,
    pub flushes: u64,
    pub activations: u64,
    pub ddl_operations: u64,
}

/// Everything the engine knows about one stream.
#[derive(Debug)]
pub struct StreamContext {
    pub stream: String,
    pub table_name: TableName,
    pub schema: StreamSchema,
    pub shape: StreamShape,
    /// Types of the live table columns, refreshed after every schema change.
    pub column_types: HashMap<String, SqlType>,
    pub batcher: RecordBatcher,
    pub version: VersionState,
    pub stats: StreamStats,
}

impl StreamContext {
    pub fn refresh_columns(&mut self, definition: Option<&DestinationTable>) {
        self.column_types = definition
            .map(|definition| {
                definition
                    .columns
                    .iter()
                    .map(|column| (column.name.clone(), column.sql_type.clone()))
                    .collect()
            })
            .unwrap_or_default();
    }
}

/// A failed write that left rows of a table uncommitted.
#[derive(Debug, Clone)]
pub struct TableFailure {
    /// Position of the first record that was not committed.
    pub first_lost_position: u64,
    pub error: SinkError,
}

/// State of a destination table, guarded by a per-table lock.
///
/// Flushes hold the lock from spawn until their checkpoint advanced, so schema changes,
/// activations and later flushes of the table wait for them.
#[derive(Debug, Default)]
pub struct TableState {
    /// Cached live definition, `None` while the table does not exist.
    pub definition: Option<DestinationTable>,
    /// Whether the definition was read from the destination yet.
    pub loaded: bool,
    pub failure: Option<TableFailure>,
}
