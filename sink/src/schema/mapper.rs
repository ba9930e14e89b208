use config::shared::{NumberMode, TargetConfig};

use crate::types::{DeclaredType, FieldSchema, FormatHint, SqlType};

/// Longest string key that stays indexable with `utf8mb4` on default InnoDB settings.
pub const MAX_KEY_VARCHAR_SIZE: u32 = 191;
/// Longest `VARCHAR` created before falling back to `LONGTEXT`.
pub const MAX_VARCHAR_SIZE: u32 = 16383;

/// Maps field schemas to MySQL column types.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TypeMapper {
    max_varchar_size: u32,
    number_mode: NumberMode,
    decimal_precision: u8,
    decimal_scale: u8,
}

impl TypeMapper {
    pub fn new(
        max_varchar_size: u32,
        number_mode: NumberMode,
        decimal_precision: u8,
        decimal_scale: u8,
    ) -> TypeMapper {
        TypeMapper {
            max_varchar_size,
            number_mode,
            decimal_precision,
            decimal_scale,
        }
    }

    pub fn from_config(config: &TargetConfig) -> TypeMapper {
        TypeMapper::new(
            config.max_varchar_size,
            config.number_mode,
            config.decimal_precision,
            config.decimal_scale,
        )
    }

    /// Returns the column type for `field`. Never fails: anything it cannot interpret becomes
    /// `LONGTEXT`.
    pub fn map(&self, field: &FieldSchema, is_key: bool) -> SqlType {
        let sql_type = match field.declared_type {
            None => SqlType::Text,
            Some(DeclaredType::Timestamp) => SqlType::Timestamp,
            Some(DeclaredType::String) => match field.format {
                Some(FormatHint::DateTime) => SqlType::Timestamp,
                Some(FormatHint::Date) => SqlType::Date,
                Some(FormatHint::Time) => SqlType::Time,
                _ => self.string_type(field.max_length, is_key),
            },
            Some(DeclaredType::Integer) => integer_type(field.minimum, field.maximum),
            Some(DeclaredType::Number) => match self.number_mode {
                NumberMode::Decimal => SqlType::Decimal {
                    precision: self.decimal_precision,
                    scale: self.decimal_scale,
                },
                NumberMode::Double => SqlType::Double,
            },
            Some(DeclaredType::Boolean) => SqlType::Boolean,
            Some(DeclaredType::Object | DeclaredType::Array) => SqlType::Json,
        };

        if is_key && !sql_type.is_indexable() {
            return SqlType::Varchar(MAX_KEY_VARCHAR_SIZE);
        }

        sql_type
    }

    fn string_type(&self, max_length: Option<u32>, is_key: bool) -> SqlType {
        let mut length = max_length.unwrap_or(self.max_varchar_size).max(1);
        if is_key {
            length = length.min(MAX_KEY_VARCHAR_SIZE);
        }

        if length > MAX_VARCHAR_SIZE {
            SqlType::Text
        } else {
            SqlType::Varchar(length)
        }
    }
}

impl Default for TypeMapper {
    fn default() -> Self {
        TypeMapper::new(
            TargetConfig::DEFAULT_MAX_VARCHAR_SIZE,
            NumberMode::Decimal,
            TargetConfig::DEFAULT_DECIMAL_PRECISION,
            TargetConfig::DEFAULT_DECIMAL_SCALE,
        )
    }
}

/// Narrowest integer type covering the declared range, `BIGINT` when it is open.
fn integer_type(minimum: Option<i64>, maximum: Option<i64>) -> SqlType {
    let (Some(minimum), Some(maximum)) = (minimum, maximum) else {
        return SqlType::BigInt;
    };

    let fits = |low: i64, high: i64| minimum >= low && maximum <= high;

    if fits(i16::MIN as i64, i16::MAX as i64) {
        SqlType::SmallInt
    } else if fits(i32::MIN as i64, i32::MAX as i64) {
        SqlType::Int
    } else {
        SqlType::BigInt
    }
}
