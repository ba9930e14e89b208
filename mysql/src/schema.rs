//! Catalog queries against `information_schema`.

use sqlx::{MySqlPool, Row};
use thiserror::Error;

use crate::types::{TableName, quote_identifier};

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid catalog data for {table}: {reason}")]
    InvalidData { table: String, reason: String },
}

/// A column as reported by `information_schema.columns`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ColumnDescription {
    pub name: String,
    /// Lowercase base type, e.g. `varchar` or `decimal`.
    pub data_type: String,
    /// Full type including modifiers, e.g. `varchar(255)` or `tinyint(1)`.
    pub column_type: String,
    pub character_maximum_length: Option<i64>,
    pub numeric_precision: Option<i64>,
    pub numeric_scale: Option<i64>,
    pub nullable: bool,
    /// Position of the column inside the primary key, if it belongs to it.
    pub primary_key_position: Option<i64>,
}

/// Reads the columns of a table in ordinal order.
///
/// Returns `None` when the table does not exist.
pub async fn describe_table(
    pool: &MySqlPool,
    table_name: &TableName,
) -> Result<Option<Vec<ColumnDescription>>, SchemaError> {
    // Every text column is cast explicitly since MySQL 8 reports several catalog columns
    // with binary collations.
    let query = r#"
        SELECT
            CAST(c.column_name AS CHAR) AS column_name,
            CAST(LOWER(c.data_type) AS CHAR) AS data_type,
            CAST(LOWER(c.column_type) AS CHAR) AS column_type,
            CAST(c.character_maximum_length AS SIGNED) AS character_maximum_length,
            CAST(c.numeric_precision AS SIGNED) AS numeric_precision,
            CAST(c.numeric_scale AS SIGNED) AS numeric_scale,
            CAST(c.is_nullable AS CHAR) AS is_nullable,
            CAST(k.ordinal_position AS SIGNED) AS primary_key_position
        FROM information_schema.columns c
        LEFT JOIN information_schema.key_column_usage k
            ON c.table_schema = k.table_schema
            AND c.table_name = k.table_name
            AND c.column_name = k.column_name
            AND k.constraint_name = 'PRIMARY'
        WHERE c.table_schema = ?
        AND c.table_name = ?
        ORDER BY c.ordinal_position
    "#;

    let rows = sqlx::query(query)
        .bind(&table_name.schema)
        .bind(&table_name.name)
        .fetch_all(pool)
        .await?;

    if rows.is_empty() {
        return Ok(None);
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let is_nullable: String = row.try_get("is_nullable")?;

        columns.push(ColumnDescription {
            name: row.try_get("column_name")?,
            data_type: row.try_get("data_type")?,
            column_type: row.try_get("column_type")?,
            character_maximum_length: row.try_get("character_maximum_length")?,
            numeric_precision: row.try_get("numeric_precision")?,
            numeric_scale: row.try_get("numeric_scale")?,
            nullable: is_nullable == "YES",
            primary_key_position: row.try_get("primary_key_position")?,
        });
    }

    Ok(Some(columns))
}

/// Returns the primary key column names of a described table, in key order.
pub fn primary_key_columns(columns: &[ColumnDescription]) -> Vec<String> {
    let mut keys = columns
        .iter()
        .filter_map(|column| {
            column
                .primary_key_position
                .map(|position| (position, column.name.clone()))
        })
        .collect::<Vec<_>>();
    keys.sort_by_key(|(position, _)| *position);

    keys.into_iter().map(|(_, name)| name).collect()
}

/// Creates the schema (database) if it does not exist yet.
pub async fn ensure_schema(pool: &MySqlPool, schema: &str) -> Result<(), SchemaError> {
    let statement = format!(
        "CREATE DATABASE IF NOT EXISTS {} CHARACTER SET utf8mb4",
        quote_identifier(schema)
    );
    sqlx::query(&statement).execute(pool).await?;

    Ok(())
}
