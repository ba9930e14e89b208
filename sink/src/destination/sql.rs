//! SQL text rendered by [`super::mysql::MySqlDestination`].
//!
//! Values are always bound as parameters. Only identifiers, which are quoted, and column
//! types end up in the statement text.

use mysql::types::quote_identifier;

use crate::schema::DdlOperation;
use crate::schema::metadata::{DELETED_AT, TABLE_VERSION};
use crate::types::{DestinationColumn, DestinationTable, TableName};

/// Table recording the last activated version of every table of a schema.
pub const TABLE_VERSIONS_TABLE: &str = "_sdc_table_versions";

/// Append-only log of acknowledged checkpoints.
pub const CHECKPOINTS_TABLE: &str = "_sdc_checkpoints";

/// Alias of the inserted row in `ON DUPLICATE KEY UPDATE` clauses on MySQL 8.0.19+.
const UPSERT_ROW_ALIAS: &str = "_sdc_new";

fn column_definition(column: &DestinationColumn) -> String {
    let nullability = if column.nullable { "NULL" } else { "NOT NULL" };

    format!(
        "{} {} {nullability}",
        quote_identifier(&column.name),
        column.sql_type
    )
}

fn quoted_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn create_table(table: &DestinationTable) -> String {
    let mut definitions: Vec<String> = table.columns.iter().map(column_definition).collect();

    if !table.primary_key.is_empty() {
        definitions.push(format!(
            "PRIMARY KEY ({})",
            quoted_list(table.primary_key.iter().map(String::as_str))
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
        table.name.as_quoted_identifier(),
        definitions.join(", ")
    )
}

pub fn add_column(table: &TableName, column: &DestinationColumn) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        table.as_quoted_identifier(),
        column_definition(column)
    )
}

/// Redefines a column with its new type and nullability.
pub fn modify_column(table: &TableName, column: &DestinationColumn) -> String {
    format!(
        "ALTER TABLE {} MODIFY COLUMN {}",
        table.as_quoted_identifier(),
        column_definition(column)
    )
}

pub fn ddl_statement(operation: &DdlOperation) -> String {
    match operation {
        DdlOperation::CreateTable(table) => create_table(table),
        DdlOperation::AddColumn { table, column } => add_column(table, column),
        DdlOperation::WidenColumn { table, column, .. }
        | DdlOperation::MakeNullable { table, column } => modify_column(table, column),
    }
}

/// `INSERT INTO ... (columns) ` ready for a `VALUES` list.
pub fn insert_prefix(table: &TableName, columns: &[&DestinationColumn]) -> String {
    format!(
        "INSERT INTO {} ({}) ",
        table.as_quoted_identifier(),
        quoted_list(columns.iter().map(|column| column.name.as_str()))
    )
}

/// `ON DUPLICATE KEY UPDATE` clause following a `VALUES` list.
///
/// Key columns are left untouched. When every column is a key the first key is assigned to
/// itself so that duplicates are still accepted.
pub fn upsert_suffix(columns: &[&DestinationColumn], keys: &[String], row_alias: bool) -> String {
    let assigned = |name: &str| {
        let column = quote_identifier(name);
        if row_alias {
            format!("{column} = {UPSERT_ROW_ALIAS}.{column}")
        } else {
            format!("{column} = VALUES({column})")
        }
    };

    let mut assignments: Vec<String> = columns
        .iter()
        .filter(|column| !keys.contains(&column.name))
        .map(|column| assigned(&column.name))
        .collect();

    if assignments.is_empty()
        && let Some(key) = keys.first()
    {
        let key = quote_identifier(key);
        assignments.push(format!("{key} = {key}"));
    }

    let alias = if row_alias {
        format!(" AS {UPSERT_ROW_ALIAS}")
    } else {
        String::new()
    };

    format!("{alias} ON DUPLICATE KEY UPDATE {}", assignments.join(", "))
}

fn key_predicate(keys: &[String]) -> String {
    keys.iter()
        .map(|key| format!("{} <=> ?", quote_identifier(key)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Locks the row matching `keys` for an update-else-insert.
pub fn select_for_update(table: &TableName, keys: &[String]) -> String {
    format!(
        "SELECT 1 FROM {} WHERE {} LIMIT 1 FOR UPDATE",
        table.as_quoted_identifier(),
        key_predicate(keys)
    )
}

/// Updates the non-key `columns` of the rows matching `keys`. Binds column values first.
pub fn update_by_keys(table: &TableName, columns: &[&DestinationColumn], keys: &[String]) -> String {
    let assignments = columns
        .iter()
        .filter(|column| !keys.contains(&column.name))
        .map(|column| format!("{} = ?", quote_identifier(&column.name)))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "UPDATE {} SET {assignments} WHERE {}",
        table.as_quoted_identifier(),
        key_predicate(keys)
    )
}

/// Removes rows older than a bound version.
pub fn hard_delete_stale(table: &TableName) -> String {
    let version = quote_identifier(TABLE_VERSION);

    format!(
        "DELETE FROM {} WHERE {version} IS NULL OR {version} < ?",
        table.as_quoted_identifier()
    )
}

/// Marks rows older than a bound version as deleted. Binds the deletion time first.
pub fn soft_delete_stale(table: &TableName) -> String {
    let version = quote_identifier(TABLE_VERSION);
    let deleted_at = quote_identifier(DELETED_AT);

    format!(
        "UPDATE {} SET {deleted_at} = ? WHERE ({version} IS NULL OR {version} < ?) AND {deleted_at} IS NULL",
        table.as_quoted_identifier()
    )
}

pub fn create_table_versions(schema: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (`table_name` VARCHAR(64) NOT NULL, `version` BIGINT NOT NULL, `activated_at` DATETIME(6) NOT NULL, PRIMARY KEY (`table_name`)) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
        TableName::new(schema, TABLE_VERSIONS_TABLE).as_quoted_identifier()
    )
}

pub fn select_table_version(schema: &str) -> String {
    format!(
        "SELECT `version` FROM {} WHERE `table_name` = ?",
        TableName::new(schema, TABLE_VERSIONS_TABLE).as_quoted_identifier()
    )
}

/// Records a version. Binds the table name, the version and the activation time, then the
/// version and activation time again for the update branch.
pub fn record_table_version(schema: &str) -> String {
    format!(
        "INSERT INTO {} (`table_name`, `version`, `activated_at`) VALUES (?, ?, ?) ON DUPLICATE KEY UPDATE `version` = ?, `activated_at` = ?",
        TableName::new(schema, TABLE_VERSIONS_TABLE).as_quoted_identifier()
    )
}

pub fn create_checkpoints(schema: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (`id` BIGINT NOT NULL AUTO_INCREMENT, `stream` VARCHAR(255) NOT NULL, `position` BIGINT NOT NULL, `committed_at` DATETIME(6) NOT NULL, PRIMARY KEY (`id`), KEY `stream_position` (`stream`, `position`)) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
        TableName::new(schema, CHECKPOINTS_TABLE).as_quoted_identifier()
    )
}

pub fn append_checkpoint(schema: &str) -> String {
    format!(
        "INSERT INTO {} (`stream`, `position`, `committed_at`) VALUES (?, ?, ?)",
        TableName::new(schema, CHECKPOINTS_TABLE).as_quoted_identifier()
    )
}

pub fn load_checkpoints(schema: &str) -> String {
    format!(
        "SELECT `stream`, MAX(`position`) AS `position` FROM {} GROUP BY `stream`",
        TableName::new(schema, CHECKPOINTS_TABLE).as_quoted_identifier()
    )
}
