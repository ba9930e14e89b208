use std::collections::HashSet;
use std::num::NonZeroI32;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use config::shared::TargetConfig;
use mysql::codes::{DUPLICATE_FIELD_NAME, error_number};
use mysql::connect::{connect_options, connect_to_destination, server_version};
use mysql::schema::{describe_table, ensure_schema};
use mysql::version::{MYSQL_8_0_19, meets_version};
use sqlx::mysql::{MySqlArguments, MySqlConnection};
use sqlx::query::Query;
use sqlx::query_builder::Separated;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::destination::{DeleteMode, Destination, WriteMode, batch_columns, sql};
use crate::error::{ErrorKind, SinkResult};
#[cfg(feature = "failpoints")]
use crate::failpoints::{
    DESTINATION_COMMIT_VERSION_AFTER_CLEANUP, DESTINATION_WRITE_MID_BATCH, sink_fail_point,
};
use crate::schema::{DdlOperation, DdlPlan};
use crate::sink_error;
use crate::types::{Cell, DestinationColumn, DestinationTable, TableName, TableRow};

/// Largest number of placeholders MySQL accepts in one prepared statement.
const MAX_STATEMENT_PARAMETERS: usize = 65_535;

/// Destination loading into a MySQL server through a [`sqlx`] connection pool.
#[derive(Debug, Clone)]
pub struct MySqlDestination {
    pool: MySqlPool,
    server_version: Option<NonZeroI32>,
    /// Schemas whose bookkeeping tables were created during this run.
    prepared_schemas: Arc<Mutex<HashSet<String>>>,
}

impl MySqlDestination {
    pub fn new(pool: MySqlPool, server_version: Option<NonZeroI32>) -> Self {
        Self {
            pool,
            server_version,
            prepared_schemas: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Connects to the configured server with one connection per concurrent flush plus one
    /// for schema changes and bookkeeping.
    pub async fn connect(config: &TargetConfig) -> SinkResult<Self> {
        let options = connect_options(&config.connection).map_err(|err| {
            sink_error!(
                ErrorKind::ConfigError,
                "Invalid MySQL connection configuration",
                err.to_string(),
                source: err
            )
        })?;

        let max_connections = u32::try_from(config.max_concurrent_flushes + 1).unwrap_or(u32::MAX);
        let pool = connect_to_destination(options, max_connections).await?;
        let server_version = server_version(&pool).await?;

        info!(?server_version, "connected to mysql destination");

        Ok(Self::new(pool, server_version))
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Returns `true` when the server accepts a row alias in `ON DUPLICATE KEY UPDATE`.
    fn supports_row_alias(&self) -> bool {
        meets_version(self.server_version, MYSQL_8_0_19)
    }

    async fn ensure_table_versions(&self, schema: &str) -> SinkResult<()> {
        let mut prepared = self.prepared_schemas.lock().await;
        if prepared.contains(schema) {
            return Ok(());
        }

        sqlx::query(&sql::create_table_versions(schema))
            .execute(&self.pool)
            .await?;
        prepared.insert(schema.to_string());

        Ok(())
    }

    async fn insert_rows(
        &self,
        connection: &mut MySqlConnection,
        table: &DestinationTable,
        columns: &[&DestinationColumn],
        rows: &[TableRow],
        upsert_keys: Option<&[String]>,
    ) -> SinkResult<()> {
        let rows_per_statement = (MAX_STATEMENT_PARAMETERS / columns.len().max(1)).max(1);

        for (index, chunk) in rows.chunks(rows_per_statement).enumerate() {
            let mut builder = QueryBuilder::<MySql>::new(sql::insert_prefix(&table.name, columns));
            builder.push_values(chunk, |mut separated, row| {
                for column in columns {
                    push_cell(&mut separated, row.get(&column.name).cloned().unwrap_or(Cell::Null));
                }
            });

            if let Some(keys) = upsert_keys {
                builder.push(sql::upsert_suffix(columns, keys, self.supports_row_alias()));
            }

            builder.build().execute(&mut *connection).await?;

            if index == 0 {
                #[cfg(feature = "failpoints")]
                sink_fail_point(DESTINATION_WRITE_MID_BATCH)?;
            }
        }

        Ok(())
    }

    /// Update-else-insert for tables whose primary key differs from the declared keys.
    async fn emulate_upsert(
        &self,
        connection: &mut MySqlConnection,
        table: &DestinationTable,
        columns: &[&DestinationColumn],
        rows: &[TableRow],
        keys: &[String],
    ) -> SinkResult<()> {
        let select = sql::select_for_update(&table.name, keys);
        let update = sql::update_by_keys(&table.name, columns, keys);
        let has_assignments = columns.iter().any(|column| !keys.contains(&column.name));

        for (index, row) in rows.iter().enumerate() {
            let mut query = sqlx::query(&select);
            for key in keys {
                query = bind_cell(query, row.get(key).cloned().unwrap_or(Cell::Null));
            }
            let existing = query.fetch_optional(&mut *connection).await?;

            match existing {
                Some(_) if has_assignments => {
                    let mut query = sqlx::query(&update);
                    for column in columns.iter().filter(|column| !keys.contains(&column.name)) {
                        query =
                            bind_cell(query, row.get(&column.name).cloned().unwrap_or(Cell::Null));
                    }
                    for key in keys {
                        query = bind_cell(query, row.get(key).cloned().unwrap_or(Cell::Null));
                    }
                    query.execute(&mut *connection).await?;
                }
                Some(_) => {}
                None => {
                    self.insert_rows(connection, table, columns, std::slice::from_ref(row), None)
                        .await?;
                }
            }

            if index == 0 {
                #[cfg(feature = "failpoints")]
                sink_fail_point(DESTINATION_WRITE_MID_BATCH)?;
            }
        }

        Ok(())
    }
}

impl Destination for MySqlDestination {
    fn name() -> &'static str {
        "mysql"
    }

    async fn shutdown(&self) -> SinkResult<()> {
        self.pool.close().await;
        info!("closed mysql connection pool");

        Ok(())
    }

    async fn load_table(&self, table_name: &TableName) -> SinkResult<Option<DestinationTable>> {
        let columns = describe_table(&self.pool, table_name).await?;

        Ok(columns.map(|columns| DestinationTable::from_descriptions(table_name.clone(), &columns)))
    }

    async fn apply_ddl(&self, plan: &DdlPlan) -> SinkResult<()> {
        for operation in plan.operations() {
            if let DdlOperation::CreateTable(table) = operation {
                ensure_schema(&self.pool, &table.name.schema).await?;
            }

            let statement = sql::ddl_statement(operation);
            debug!(%statement, "executing ddl");

            // DDL commits on its own, so a retried plan can meet columns it already added.
            match sqlx::query(&statement).execute(&self.pool).await {
                Ok(_) => {}
                Err(err)
                    if matches!(operation, DdlOperation::AddColumn { .. })
                        && error_number(&err) == Some(DUPLICATE_FIELD_NAME) =>
                {
                    debug!(%statement, "column already exists");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }

            match operation {
                DdlOperation::CreateTable(table) => {
                    info!(table = %table.name, columns = table.columns.len(), "created table");
                }
                DdlOperation::AddColumn { table, column } => {
                    info!(%table, column = %column.name, sql_type = %column.sql_type, "added column");
                }
                DdlOperation::WidenColumn {
                    table,
                    column,
                    from,
                } => {
                    info!(%table, column = %column.name, %from, to = %column.sql_type, "widened column");
                }
                DdlOperation::MakeNullable { table, column } => {
                    info!(%table, column = %column.name, "made column nullable");
                }
            }
        }

        Ok(())
    }

    async fn write_batch(
        &self,
        table: &DestinationTable,
        rows: &[TableRow],
        mode: &WriteMode,
    ) -> SinkResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let columns = batch_columns(table, rows);
        let mut transaction = self.pool.begin().await?;

        match mode {
            WriteMode::Append => {
                self.insert_rows(&mut transaction, table, &columns, rows, None)
                    .await?;
            }
            WriteMode::Upsert { keys } if table.primary_key_matches(keys) => {
                self.insert_rows(&mut transaction, table, &columns, rows, Some(keys))
                    .await?;
            }
            WriteMode::Upsert { keys } => {
                debug!(
                    table = %table.name,
                    primary_key = ?table.primary_key,
                    ?keys,
                    "primary key differs from key properties, emulating upsert"
                );
                self.emulate_upsert(&mut transaction, table, &columns, rows, keys)
                    .await?;
            }
        }

        transaction.commit().await?;

        Ok(rows.len() as u64)
    }

    async fn committed_version(&self, table_name: &TableName) -> SinkResult<Option<i64>> {
        self.ensure_table_versions(&table_name.schema).await?;

        let version = sqlx::query_scalar::<_, i64>(&sql::select_table_version(&table_name.schema))
            .bind(&table_name.name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(version)
    }

    async fn commit_version(
        &self,
        table: &DestinationTable,
        version: i64,
        cleanup: Option<DeleteMode>,
        deleted_at: DateTime<Utc>,
    ) -> SinkResult<u64> {
        let schema = &table.name.schema;
        self.ensure_table_versions(schema).await?;

        let mut transaction = self.pool.begin().await?;

        let cleaned = match cleanup {
            None => 0,
            Some(DeleteMode::Hard) => sqlx::query(&sql::hard_delete_stale(&table.name))
                .bind(version)
                .execute(&mut *transaction)
                .await?
                .rows_affected(),
            Some(DeleteMode::Soft) => sqlx::query(&sql::soft_delete_stale(&table.name))
                .bind(deleted_at.naive_utc())
                .bind(version)
                .execute(&mut *transaction)
                .await?
                .rows_affected(),
        };

        #[cfg(feature = "failpoints")]
        sink_fail_point(DESTINATION_COMMIT_VERSION_AFTER_CLEANUP)?;

        let activated_at = Utc::now().naive_utc();
        sqlx::query(&sql::record_table_version(schema))
            .bind(&table.name.name)
            .bind(version)
            .bind(activated_at)
            .bind(version)
            .bind(activated_at)
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;

        info!(table = %table.name, version, cleaned, "committed table version");

        Ok(cleaned)
    }
}

fn push_cell(separated: &mut Separated<'_, '_, MySql, &'static str>, cell: Cell) {
    match cell {
        Cell::Null => separated.push_bind(None::<String>),
        Cell::Bool(value) => separated.push_bind(value),
        Cell::I64(value) => separated.push_bind(value),
        Cell::F64(value) => separated.push_bind(value),
        Cell::Decimal(value) => separated.push_bind(value),
        Cell::String(value) | Cell::Json(value) => separated.push_bind(value),
        Cell::Date(value) => separated.push_bind(value),
        Cell::Time(value) => separated.push_bind(value),
        Cell::Timestamp(value) => separated.push_bind(value.naive_utc()),
    };
}

fn bind_cell<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    cell: Cell,
) -> Query<'q, MySql, MySqlArguments> {
    match cell {
        Cell::Null => query.bind(None::<String>),
        Cell::Bool(value) => query.bind(value),
        Cell::I64(value) => query.bind(value),
        Cell::F64(value) => query.bind(value),
        Cell::Decimal(value) => query.bind(value),
        Cell::String(value) | Cell::Json(value) => query.bind(value),
        Cell::Date(value) => query.bind(value),
        Cell::Time(value) => query.bind(value),
        Cell::Timestamp(value) => query.bind(value.naive_utc()),
    }
}
