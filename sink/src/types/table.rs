use std::fmt;

use mysql::schema::ColumnDescription;

use crate::types::TableName;

/// Destination column type.
///
/// Renders as MySQL DDL through [`fmt::Display`].
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum SqlType {
    /// `TINYINT(1)`.
    Boolean,
    SmallInt,
    Int,
    BigInt,
    Decimal { precision: u8, scale: u8 },
    Double,
    Date,
    /// `TIME(6)`.
    Time,
    /// `DATETIME(6)` holding UTC instants.
    Timestamp,
    Varchar(u32),
    /// `LONGTEXT`.
    Text,
    Json,
    /// A type this loader never creates, kept verbatim and never altered.
    Other(String),
}

impl SqlType {
    /// Interprets a column read from `information_schema.columns`.
    pub fn from_description(column: &ColumnDescription) -> SqlType {
        let column_type = column.column_type.to_ascii_lowercase();

        match column.data_type.to_ascii_lowercase().as_str() {
            "tinyint" if column_type.starts_with("tinyint(1)") => SqlType::Boolean,
            "smallint" if !column_type.contains("unsigned") => SqlType::SmallInt,
            "int" if !column_type.contains("unsigned") => SqlType::Int,
            "bigint" if !column_type.contains("unsigned") => SqlType::BigInt,
            "decimal" => match (column.numeric_precision, column.numeric_scale) {
                (Some(precision), Some(scale)) => SqlType::Decimal {
                    precision: u8::try_from(precision).unwrap_or(u8::MAX),
                    scale: u8::try_from(scale).unwrap_or(u8::MAX),
                },
                _ => SqlType::Other(column_type),
            },
            "double" => SqlType::Double,
            "date" => SqlType::Date,
            "time" => SqlType::Time,
            "datetime" | "timestamp" => SqlType::Timestamp,
            "varchar" => match column.character_maximum_length {
                Some(length) => SqlType::Varchar(u32::try_from(length).unwrap_or(u32::MAX)),
                None => SqlType::Other(column_type),
            },
            "text" | "mediumtext" | "longtext" => SqlType::Text,
            "json" => SqlType::Json,
            _ => SqlType::Other(column_type),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            SqlType::Boolean | SqlType::SmallInt | SqlType::Int | SqlType::BigInt
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, SqlType::Date | SqlType::Time | SqlType::Timestamp)
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, SqlType::Varchar(_) | SqlType::Text)
    }

    /// Returns `true` when the type can be part of a MySQL primary key without a prefix length.
    pub fn is_indexable(&self) -> bool {
        !matches!(self, SqlType::Text | SqlType::Json | SqlType::Other(_))
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Boolean => f.write_str("TINYINT(1)"),
            SqlType::SmallInt => f.write_str("SMALLINT"),
            SqlType::Int => f.write_str("INT"),
            SqlType::BigInt => f.write_str("BIGINT"),
            SqlType::Decimal { precision, scale } => write!(f, "DECIMAL({precision},{scale})"),
            SqlType::Double => f.write_str("DOUBLE"),
            SqlType::Date => f.write_str("DATE"),
            SqlType::Time => f.write_str("TIME(6)"),
            SqlType::Timestamp => f.write_str("DATETIME(6)"),
            SqlType::Varchar(length) => write!(f, "VARCHAR({length})"),
            SqlType::Text => f.write_str("LONGTEXT"),
            SqlType::Json => f.write_str("JSON"),
            SqlType::Other(name) => f.write_str(name),
        }
    }
}

/// A column of a destination table.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DestinationColumn {
    /// Conformed column name.
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
}

impl DestinationColumn {
    pub fn new(name: impl Into<String>, sql_type: SqlType, nullable: bool) -> DestinationColumn {
        DestinationColumn {
            name: name.into(),
            sql_type,
            nullable,
        }
    }
}

/// Live definition of a destination table as known by the engine.
///
/// Columns are only ever appended or widened, never removed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DestinationTable {
    pub name: TableName,
    pub columns: Vec<DestinationColumn>,
    /// Primary key columns of the live table, in key order.
    pub primary_key: Vec<String>,
}

impl DestinationTable {
    pub fn new(
        name: TableName,
        columns: Vec<DestinationColumn>,
        primary_key: Vec<String>,
    ) -> DestinationTable {
        DestinationTable {
            name,
            columns,
            primary_key,
        }
    }

    /// Builds a table definition from `information_schema` columns.
    pub fn from_descriptions(name: TableName, columns: &[ColumnDescription]) -> DestinationTable {
        let primary_key = mysql::schema::primary_key_columns(columns);
        let columns = columns
            .iter()
            .map(|column| {
                DestinationColumn::new(
                    column.name.clone(),
                    SqlType::from_description(column),
                    column.nullable,
                )
            })
            .collect();

        DestinationTable::new(name, columns, primary_key)
    }

    pub fn column(&self, name: &str) -> Option<&DestinationColumn> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut DestinationColumn> {
        self.columns.iter_mut().find(|column| column.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Appends a column unless one with the same name already exists.
    pub fn push_column(&mut self, column: DestinationColumn) {
        if !self.has_column(&column.name) {
            self.columns.push(column);
        }
    }

    /// Returns `true` when the live primary key is exactly `keys`, in any order.
    pub fn primary_key_matches(&self, keys: &[String]) -> bool {
        self.primary_key.len() == keys.len()
            && keys.iter().all(|key| self.primary_key.contains(key))
    }
}
