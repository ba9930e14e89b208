use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bail;
use crate::destination::{DeleteMode, Destination, WriteMode, batch_columns};
use crate::error::{ErrorKind, SinkResult};
use crate::schema::metadata::{DELETED_AT, TABLE_VERSION};
use crate::schema::{DdlOperation, DdlPlan};
use crate::sink_error;
use crate::types::{Cell, DestinationTable, TableName, TableRow};

/// Operations of [`MemoryDestination`] that faults can be injected into.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum FaultTarget {
    ApplyDdl,
    WriteBatch,
    CommitVersion,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<TableName, DestinationTable>,
    /// Stored rows carry a cell for every column of their table, in column order.
    rows: HashMap<TableName, Vec<TableRow>>,
    versions: HashMap<TableName, i64>,
    ddl_log: Vec<DdlOperation>,
    faults: HashMap<FaultTarget, (ErrorKind, usize)>,
    /// Fails the next write after this many rows were applied to the working copy.
    fail_write_after_rows: Option<usize>,
    /// Tables every write to fails.
    rejecting_tables: HashMap<TableName, ErrorKind>,
    write_attempts: usize,
}

impl Inner {
    fn take_fault(&mut self, target: FaultTarget) -> Option<ErrorKind> {
        let (kind, remaining) = self.faults.get_mut(&target)?;
        let kind = *kind;
        *remaining -= 1;

        if *remaining == 0 {
            self.faults.remove(&target);
        }

        Some(kind)
    }

    fn apply_operation(&mut self, operation: &DdlOperation) -> SinkResult<()> {
        match operation {
            DdlOperation::CreateTable(table) => {
                if !self.tables.contains_key(&table.name) {
                    self.tables.insert(table.name.clone(), table.clone());
                    self.rows.insert(table.name.clone(), Vec::new());
                }
            }
            DdlOperation::AddColumn { table, column } => {
                let definition = self.table_mut(table)?;
                if !definition.has_column(&column.name) {
                    definition.push_column(column.clone());

                    for row in self.rows.entry(table.clone()).or_default() {
                        row.set(&column.name, Cell::Null);
                    }
                }
            }
            DdlOperation::WidenColumn { table, column, .. }
            | DdlOperation::MakeNullable { table, column } => {
                let definition = self.table_mut(table)?;
                let Some(existing) = definition.column_mut(&column.name) else {
                    bail!(
                        ErrorKind::DestinationTableMissing,
                        "Column does not exist",
                        format!("column `{}` of table {table}", column.name)
                    );
                };

                existing.sql_type = column.sql_type.clone();
                existing.nullable = column.nullable;
            }
        }

        self.ddl_log.push(operation.clone());

        Ok(())
    }

    fn table_mut(&mut self, table_name: &TableName) -> SinkResult<&mut DestinationTable> {
        self.tables.get_mut(table_name).ok_or_else(|| {
            sink_error!(
                ErrorKind::DestinationTableMissing,
                "Table does not exist",
                format!("table {table_name}")
            )
        })
    }
}

/// In-memory destination for tests.
///
/// Mirrors the transactional behavior of a real database: every mutating call works on a copy
/// of the affected rows that only replaces the stored rows once the call succeeds. Faults can
/// be injected into each operation to exercise retries and rollbacks.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` calls of `target` fail with `kind` without any effect.
    pub async fn fail_next(&self, target: FaultTarget, kind: ErrorKind, times: usize) {
        if times == 0 {
            return;
        }

        let mut inner = self.inner.lock().await;
        inner.faults.insert(target, (kind, times));
    }

    /// Makes the next write fail after `rows` rows of its batch were written.
    pub async fn fail_next_write_after(&self, rows: usize) {
        let mut inner = self.inner.lock().await;
        inner.fail_write_after_rows = Some(rows);
    }

    /// Makes every write to `table_name` fail with `kind`.
    pub async fn reject_writes_to(&self, table_name: &TableName, kind: ErrorKind) {
        let mut inner = self.inner.lock().await;
        inner.rejecting_tables.insert(table_name.clone(), kind);
    }

    /// Stores a row as is, bypassing write semantics.
    pub async fn insert_raw_row(&self, table_name: &TableName, row: TableRow) {
        let mut inner = self.inner.lock().await;
        inner.rows.entry(table_name.clone()).or_default().push(row);
    }

    pub async fn table(&self, table_name: &TableName) -> Option<DestinationTable> {
        let inner = self.inner.lock().await;
        inner.tables.get(table_name).cloned()
    }

    pub async fn table_rows(&self, table_name: &TableName) -> Vec<TableRow> {
        let inner = self.inner.lock().await;
        inner.rows.get(table_name).cloned().unwrap_or_default()
    }

    pub async fn version(&self, table_name: &TableName) -> Option<i64> {
        let inner = self.inner.lock().await;
        inner.versions.get(table_name).copied()
    }

    /// Every DDL operation applied so far, in order.
    pub async fn ddl_log(&self) -> Vec<DdlOperation> {
        let inner = self.inner.lock().await;
        inner.ddl_log.clone()
    }

    /// Number of `write_batch` calls, failed ones included.
    pub async fn write_attempts(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.write_attempts
    }
}

impl Destination for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn load_table(&self, table_name: &TableName) -> SinkResult<Option<DestinationTable>> {
        let inner = self.inner.lock().await;
        Ok(inner.tables.get(table_name).cloned())
    }

    async fn apply_ddl(&self, plan: &DdlPlan) -> SinkResult<()> {
        let mut inner = self.inner.lock().await;

        if let Some(kind) = inner.take_fault(FaultTarget::ApplyDdl) {
            bail!(kind, "Injected DDL failure");
        }

        // MySQL commits every DDL statement on its own, so a failing plan keeps the
        // operations applied before the failure.
        for operation in plan.operations() {
            inner.apply_operation(operation)?;
        }

        debug!(operations = plan.len(), "applied ddl plan");

        Ok(())
    }

    async fn write_batch(
        &self,
        table: &DestinationTable,
        rows: &[TableRow],
        mode: &WriteMode,
    ) -> SinkResult<u64> {
        let mut inner = self.inner.lock().await;
        inner.write_attempts += 1;

        if let Some(kind) = inner.take_fault(FaultTarget::WriteBatch) {
            bail!(kind, "Injected write failure", format!("table {}", table.name));
        }

        if let Some(kind) = inner.rejecting_tables.get(&table.name).copied() {
            bail!(kind, "Table rejects writes", format!("table {}", table.name));
        }

        let Some(definition) = inner.tables.get(&table.name).cloned() else {
            bail!(
                ErrorKind::DestinationTableMissing,
                "Table does not exist",
                format!("table {}", table.name)
            );
        };

        let columns = batch_columns(&definition, rows);
        if let Some(row) = rows.iter().find(|row| {
            row.values()
                .iter()
                .any(|(name, _)| !definition.has_column(name))
        }) {
            bail!(
                ErrorKind::DestinationTableMissing,
                "Row carries an unknown column",
                format!("row at position {} for table {}", row.position(), table.name)
            );
        }

        let fail_after = inner.fail_write_after_rows.take();
        let mut working = inner.rows.get(&table.name).cloned().unwrap_or_default();

        for (index, row) in rows.iter().enumerate() {
            if fail_after == Some(index) {
                bail!(
                    ErrorKind::DestinationQueryFailed,
                    "Injected failure in the middle of a batch",
                    format!("{index} rows written to table {}", table.name)
                );
            }

            for column in &definition.columns {
                let provided = columns.iter().any(|provided| provided.name == column.name);
                if provided && !column.nullable && row.get(&column.name).is_none_or(Cell::is_null) {
                    bail!(
                        ErrorKind::ConstraintViolation,
                        "Column cannot be null",
                        format!("column `{}` of table {}", column.name, table.name)
                    );
                }
            }

            let existing = match mode {
                WriteMode::Append => None,
                WriteMode::Upsert { keys } => working.iter_mut().find(|stored| {
                    keys.iter()
                        .all(|key| stored.get(key) == Some(row.get(key).unwrap_or(&Cell::Null)))
                }),
            };

            match existing {
                Some(stored) => {
                    for column in &columns {
                        let cell = row.get(&column.name).cloned().unwrap_or(Cell::Null);
                        stored.set(&column.name, cell);
                    }
                }
                None => {
                    let values = definition
                        .columns
                        .iter()
                        .map(|column| {
                            let cell = row.get(&column.name).cloned().unwrap_or(Cell::Null);
                            (column.name.clone(), cell)
                        })
                        .collect();
                    working.push(TableRow::new(row.position(), values));
                }
            }
        }

        inner.rows.insert(table.name.clone(), working);

        Ok(rows.len() as u64)
    }

    async fn committed_version(&self, table_name: &TableName) -> SinkResult<Option<i64>> {
        let inner = self.inner.lock().await;
        Ok(inner.versions.get(table_name).copied())
    }

    async fn commit_version(
        &self,
        table: &DestinationTable,
        version: i64,
        cleanup: Option<DeleteMode>,
        deleted_at: DateTime<Utc>,
    ) -> SinkResult<u64> {
        let mut inner = self.inner.lock().await;

        if let Some(kind) = inner.take_fault(FaultTarget::CommitVersion) {
            bail!(kind, "Injected activation failure", format!("table {}", table.name));
        }

        let mut working = inner.rows.get(&table.name).cloned().unwrap_or_default();
        let is_stale = |row: &TableRow| match row.get(TABLE_VERSION).and_then(Cell::as_i64) {
            Some(stored) => stored < version,
            None => true,
        };

        let cleaned = match cleanup {
            None => 0,
            Some(DeleteMode::Hard) => {
                let before = working.len();
                working.retain(|row| !is_stale(row));
                before - working.len()
            }
            Some(DeleteMode::Soft) => {
                let mut marked = 0;
                for row in working.iter_mut() {
                    if is_stale(row) && row.get(DELETED_AT).is_none_or(Cell::is_null) {
                        row.set(DELETED_AT, Cell::Timestamp(deleted_at));
                        marked += 1;
                    }
                }
                marked
            }
        };

        inner.rows.insert(table.name.clone(), working);
        inner.versions.insert(table.name.clone(), version);

        info!(table = %table.name, version, cleaned, "committed table version");

        Ok(cleaned as u64)
    }
}
