use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::SinkResult;
use crate::schema::DdlPlan;
use crate::types::{DestinationColumn, DestinationTable, TableName, TableRow};

/// How a batch is merged into its table.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum WriteMode {
    /// Every row is inserted, duplicates included.
    Append,
    /// Rows replace the row with the same values in `keys`, or are inserted.
    Upsert { keys: Vec<String> },
}

impl WriteMode {
    /// Upserts on `keys`, appending when there are none.
    pub fn from_keys(keys: &[String]) -> WriteMode {
        if keys.is_empty() {
            WriteMode::Append
        } else {
            WriteMode::Upsert {
                keys: keys.to_vec(),
            }
        }
    }
}

/// What happens to rows of an older version when a newer one is activated.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DeleteMode {
    /// Rows are deleted.
    Hard,
    /// Rows are kept with `_sdc_deleted_at` set.
    Soft,
}

impl DeleteMode {
    pub fn from_hard_delete(hard_delete: bool) -> DeleteMode {
        if hard_delete {
            DeleteMode::Hard
        } else {
            DeleteMode::Soft
        }
    }
}

/// A database tables are materialized into.
///
/// Every mutating method runs in a single transaction: either all of its effects are visible
/// afterwards or none are. The engine serializes calls per table, while calls for distinct
/// tables may run concurrently.
pub trait Destination {
    /// Returns the name of the destination.
    fn name() -> &'static str;

    /// Releases the resources held by the destination.
    ///
    /// The default implementation is a no-op.
    fn shutdown(&self) -> impl Future<Output = SinkResult<()>> + Send {
        async { Ok(()) }
    }

    /// Reads the live definition of a table, or `None` when it does not exist.
    fn load_table(
        &self,
        table_name: &TableName,
    ) -> impl Future<Output = SinkResult<Option<DestinationTable>>> + Send;

    /// Applies a DDL plan in order.
    ///
    /// Applying an operation the table already satisfies must succeed, since a plan may be
    /// retried after a partial failure.
    fn apply_ddl(&self, plan: &DdlPlan) -> impl Future<Output = SinkResult<()>> + Send;

    /// Writes `rows` into `table` in one transaction and returns the number of rows written.
    ///
    /// Only the columns returned by [`batch_columns`] are written. Rows lacking one of them
    /// write `NULL` into it.
    fn write_batch(
        &self,
        table: &DestinationTable,
        rows: &[TableRow],
        mode: &WriteMode,
    ) -> impl Future<Output = SinkResult<u64>> + Send;

    /// Returns the last version activated for the table.
    fn committed_version(
        &self,
        table_name: &TableName,
    ) -> impl Future<Output = SinkResult<Option<i64>>> + Send;

    /// Records `version` as activated for the table.
    ///
    /// When `cleanup` is set, rows whose `_sdc_table_version` is `NULL` or lower than
    /// `version` are removed or marked as deleted at `deleted_at` in the same transaction.
    /// Returns the number of rows cleaned up.
    fn commit_version(
        &self,
        table: &DestinationTable,
        version: i64,
        cleanup: Option<DeleteMode>,
        deleted_at: DateTime<Utc>,
    ) -> impl Future<Output = SinkResult<u64>> + Send;
}

/// Columns of `table` carried by at least one of `rows`, in table order.
pub fn batch_columns<'a>(table: &'a DestinationTable, rows: &[TableRow]) -> Vec<&'a DestinationColumn> {
    table
        .columns
        .iter()
        .filter(|column| rows.iter().any(|row| row.get(&column.name).is_some()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cell, SqlType};

    #[test]
    fn batch_columns_follow_table_order() {
        let table = DestinationTable::new(
            TableName::new("db", "animals"),
            vec![
                DestinationColumn::new("id", SqlType::BigInt, false),
                DestinationColumn::new("name", SqlType::Varchar(255), true),
                DestinationColumn::new("extra", SqlType::Varchar(255), true),
            ],
            vec!["id".to_string()],
        );
        let rows = vec![
            TableRow::new(
                1,
                vec![
                    ("extra".to_string(), Cell::String("x".to_string())),
                    ("id".to_string(), Cell::I64(1)),
                ],
            ),
            TableRow::new(2, vec![("id".to_string(), Cell::I64(2))]),
        ];

        let columns: Vec<&str> = batch_columns(&table, &rows)
            .into_iter()
            .map(|column| column.name.as_str())
            .collect();
        assert_eq!(columns, vec!["id", "extra"]);
    }

    #[test]
    fn write_mode_depends_on_keys() {
        assert_eq!(WriteMode::from_keys(&[]), WriteMode::Append);
        assert_eq!(
            WriteMode::from_keys(&["id".to_string()]),
            WriteMode::Upsert {
                keys: vec!["id".to_string()]
            }
        );
    }
}
