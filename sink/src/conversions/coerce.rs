use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::{Number, Value};

use crate::conversions::temporal::{parse_date, parse_time, parse_timestamp};
use crate::error::{ErrorKind, SinkError, SinkResult};
use crate::sink_error;
use crate::types::{Cell, SqlType};

/// Longest excerpt of an offending value included in error details.
const VALUE_EXCERPT_LENGTH: usize = 64;

/// Coerces a JSON value into a cell of the given column type.
///
/// Fails with [`ErrorKind::MalformedRecord`] when the value cannot be represented without
/// loss, naming the column and the expected type.
pub fn coerce_value(column: &str, value: &Value, sql_type: &SqlType) -> SinkResult<Cell> {
    if value.is_null() {
        return Ok(Cell::Null);
    }

    let coerced = match sql_type {
        SqlType::Boolean => coerce_bool(value),
        SqlType::SmallInt => coerce_integer(value, i16::MIN as i64, i16::MAX as i64),
        SqlType::Int => coerce_integer(value, i32::MIN as i64, i32::MAX as i64),
        SqlType::BigInt => coerce_integer(value, i64::MIN, i64::MAX),
        SqlType::Decimal { precision, scale } => coerce_decimal(value, *precision, *scale),
        SqlType::Double => coerce_double(value),
        SqlType::Date => match value {
            Value::String(text) => parse_date(text).map(Cell::Date).ok(),
            _ => None,
        },
        SqlType::Time => match value {
            Value::String(text) => parse_time(text).map(Cell::Time).ok(),
            _ => None,
        },
        SqlType::Timestamp => match value {
            Value::String(text) => parse_timestamp(text).map(Cell::Timestamp).ok(),
            _ => None,
        },
        SqlType::Varchar(length) => {
            let text = render_text(value)?;
            (text.chars().count() <= *length as usize).then_some(Cell::String(text))
        }
        SqlType::Text | SqlType::Other(_) => Some(Cell::String(render_text(value)?)),
        SqlType::Json => Some(Cell::Json(serde_json::to_string(value)?)),
    };

    coerced.ok_or_else(|| malformed(column, value, sql_type))
}

fn coerce_bool(value: &Value) -> Option<Cell> {
    match value {
        Value::Bool(value) => Some(Cell::Bool(*value)),
        Value::Number(number) => match number.as_i64() {
            Some(0) => Some(Cell::Bool(false)),
            Some(1) => Some(Cell::Bool(true)),
            _ => None,
        },
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" => Some(Cell::Bool(true)),
            "false" | "f" | "0" | "no" => Some(Cell::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_integer(value: &Value, min: i64, max: i64) -> Option<Cell> {
    let integer = match value {
        Value::Number(number) => number_as_i64(number)?,
        Value::String(text) => text.trim().parse::<i64>().ok()?,
        Value::Bool(value) => i64::from(*value),
        _ => return None,
    };

    (min..=max).contains(&integer).then_some(Cell::I64(integer))
}

fn number_as_i64(number: &Number) -> Option<i64> {
    if let Some(integer) = number.as_i64() {
        return Some(integer);
    }

    // Whole floats such as `3.0` are accepted, anything with a fraction is not.
    let float = number.as_f64()?;
    if float.fract() == 0.0 && float >= i64::MIN as f64 && float < i64::MAX as f64 {
        Some(float as i64)
    } else {
        None
    }
}

fn coerce_decimal(value: &Value, precision: u8, scale: u8) -> Option<Cell> {
    let decimal = match value {
        Value::Number(number) => BigDecimal::from_str(&number.to_string()).ok()?,
        Value::String(text) => BigDecimal::from_str(text.trim()).ok()?,
        _ => return None,
    };

    let rounded = decimal.round(i64::from(scale));
    let integer_part = rounded.with_scale(0).abs();
    let integer_digits = if integer_part == BigDecimal::from(0) {
        0
    } else {
        integer_part.digits()
    };

    (integer_digits <= u64::from(precision.saturating_sub(scale)))
        .then_some(Cell::Decimal(rounded))
}

fn coerce_double(value: &Value) -> Option<Cell> {
    let float = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    float.is_finite().then_some(Cell::F64(float))
}

/// Renders a value as text: strings verbatim, scalars in JSON notation and structures as
/// serialized JSON.
fn render_text(value: &Value) -> SinkResult<String> {
    Ok(match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(value) => value.to_string(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value)?,
    })
}

fn malformed(column: &str, value: &Value, sql_type: &SqlType) -> SinkError {
    let mut excerpt = value.to_string();
    if excerpt.len() > VALUE_EXCERPT_LENGTH {
        let mut end = VALUE_EXCERPT_LENGTH;
        while !excerpt.is_char_boundary(end) {
            end -= 1;
        }
        excerpt.truncate(end);
        excerpt.push_str("...");
    }

    sink_error!(
        ErrorKind::MalformedRecord,
        "Value cannot be stored in its column",
        format!("column `{column}` expects {sql_type}, got {excerpt}")
    )
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    use super::*;

    fn coerce(value: Value, sql_type: SqlType) -> SinkResult<Cell> {
        coerce_value("c", &value, &sql_type)
    }

    #[test]
    fn nulls_fit_every_type() {
        assert_eq!(coerce(Value::Null, SqlType::BigInt).unwrap(), Cell::Null);
        assert_eq!(coerce(Value::Null, SqlType::Json).unwrap(), Cell::Null);
    }

    #[test]
    fn integers_respect_column_ranges() {
        assert_eq!(coerce(json!(42), SqlType::SmallInt).unwrap(), Cell::I64(42));
        assert_eq!(coerce(json!("42"), SqlType::BigInt).unwrap(), Cell::I64(42));
        assert_eq!(coerce(json!(3.0), SqlType::Int).unwrap(), Cell::I64(3));
        assert_eq!(
            coerce(json!(70000), SqlType::SmallInt).unwrap_err().kind(),
            ErrorKind::MalformedRecord
        );
        assert!(coerce(json!(3.5), SqlType::BigInt).is_err());
        assert!(coerce(json!("abc"), SqlType::BigInt).is_err());
    }

    #[test]
    fn decimals_round_to_scale_and_check_integer_digits() {
        let ten_two = SqlType::Decimal {
            precision: 10,
            scale: 2,
        };

        assert_eq!(
            coerce(json!(1234.5678), ten_two.clone()).unwrap(),
            Cell::Decimal(BigDecimal::from_str("1234.57").unwrap())
        );
        assert!(coerce(json!(123456789012u64), ten_two.clone()).is_err());
        assert_eq!(
            coerce(json!("-0.5"), ten_two).unwrap(),
            Cell::Decimal(BigDecimal::from_str("-0.5").unwrap())
        );
    }

    #[test]
    fn strings_must_fit_their_varchar() {
        assert_eq!(
            coerce(json!("abc"), SqlType::Varchar(3)).unwrap(),
            Cell::String("abc".to_string())
        );
        assert!(coerce(json!("abcd"), SqlType::Varchar(3)).is_err());
        assert_eq!(
            coerce(json!(12), SqlType::Varchar(10)).unwrap(),
            Cell::String("12".to_string())
        );
    }

    #[test]
    fn structures_become_json_text() {
        assert_eq!(
            coerce(json!({"a": [1, 2]}), SqlType::Json).unwrap(),
            Cell::Json(r#"{"a":[1,2]}"#.to_string())
        );
        assert_eq!(
            coerce(json!([1, "x"]), SqlType::Text).unwrap(),
            Cell::String(r#"[1,"x"]"#.to_string())
        );
    }

    #[test]
    fn temporal_values_are_parsed() {
        assert_eq!(
            coerce(json!("2019-01-31T15:51:47Z"), SqlType::Timestamp).unwrap(),
            Cell::Timestamp(Utc.with_ymd_and_hms(2019, 1, 31, 15, 51, 47).unwrap())
        );
        assert_eq!(
            coerce(json!("2019-01-31"), SqlType::Date).unwrap(),
            Cell::Date(NaiveDate::from_ymd_opt(2019, 1, 31).unwrap())
        );
        assert!(coerce(json!(12), SqlType::Timestamp).is_err());
    }

    #[test]
    fn booleans_accept_common_spellings() {
        assert_eq!(coerce(json!(true), SqlType::Boolean).unwrap(), Cell::Bool(true));
        assert_eq!(coerce(json!(0), SqlType::Boolean).unwrap(), Cell::Bool(false));
        assert_eq!(coerce(json!("yes"), SqlType::Boolean).unwrap(), Cell::Bool(true));
        assert!(coerce(json!(2), SqlType::Boolean).is_err());
    }
}
