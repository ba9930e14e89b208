//! Metadata columns written next to the data of every row.

use crate::types::{DestinationColumn, SqlType};

/// When the source extracted the record.
pub const EXTRACTED_AT: &str = "_sdc_extracted_at";
/// When the loader received the record.
pub const RECEIVED_AT: &str = "_sdc_received_at";
/// When the row's batch was flushed.
pub const BATCHED_AT: &str = "_sdc_batched_at";
/// When the row was soft deleted, either by the source or by a version activation.
pub const DELETED_AT: &str = "_sdc_deleted_at";
/// Full-table snapshot version the row was last written by.
pub const TABLE_VERSION: &str = "_sdc_table_version";
/// Position of the source message the row was built from.
pub const SEQUENCE: &str = "_sdc_sequence";

/// Returns the metadata columns of a table.
///
/// The version and deletion columns are always present since version activation depends on
/// them. The others only when record metadata is enabled.
pub fn metadata_columns(add_record_metadata: bool) -> Vec<DestinationColumn> {
    let mut columns = Vec::with_capacity(6);

    if add_record_metadata {
        columns.push(DestinationColumn::new(EXTRACTED_AT, SqlType::Timestamp, true));
        columns.push(DestinationColumn::new(RECEIVED_AT, SqlType::Timestamp, true));
        columns.push(DestinationColumn::new(BATCHED_AT, SqlType::Timestamp, true));
    }

    columns.push(DestinationColumn::new(DELETED_AT, SqlType::Timestamp, true));
    columns.push(DestinationColumn::new(TABLE_VERSION, SqlType::BigInt, true));

    if add_record_metadata {
        columns.push(DestinationColumn::new(SEQUENCE, SqlType::BigInt, true));
    }

    columns
}

/// Returns `true` for column names reserved for metadata.
pub fn is_metadata_column(name: &str) -> bool {
    matches!(
        name,
        EXTRACTED_AT | RECEIVED_AT | BATCHED_AT | DELETED_AT | TABLE_VERSION | SEQUENCE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_and_deletion_columns_are_always_present() {
        let names: Vec<_> = metadata_columns(false)
            .into_iter()
            .map(|column| column.name)
            .collect();
        assert_eq!(names, vec![DELETED_AT, TABLE_VERSION]);
    }

    #[test]
    fn record_metadata_adds_timestamps_and_sequence() {
        let columns = metadata_columns(true);
        assert_eq!(columns.len(), 6);
        assert!(columns.iter().all(|column| column.nullable));
        assert!(columns.iter().all(|column| is_metadata_column(&column.name)));
    }
}
