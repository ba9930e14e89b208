use serde_json::Value;

use crate::types::{DeclaredType, FieldSchema};

/// Infers the field schema of an undeclared record value.
///
/// Returns `None` for `null`, which says nothing about the type; the column is created once a
/// non-null value shows up. Strings are inferred as untyped so that they land in `LONGTEXT`,
/// which every later declaration of the field is satisfied by.
pub fn infer_field(column: &str, value: &Value) -> Option<FieldSchema> {
    let declared_type = match value {
        Value::Null => return None,
        Value::Bool(_) => Some(DeclaredType::Boolean),
        Value::Number(number) if number.is_i64() || number.is_u64() => {
            Some(DeclaredType::Integer)
        }
        Value::Number(_) => Some(DeclaredType::Number),
        Value::String(_) => None,
        Value::Array(_) => Some(DeclaredType::Array),
        Value::Object(_) => Some(DeclaredType::Object),
    };

    Some(FieldSchema::new(column, declared_type))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn infers_types_from_values() {
        assert_eq!(
            infer_field("n", &json!(1)).unwrap().declared_type,
            Some(DeclaredType::Integer)
        );
        assert_eq!(
            infer_field("n", &json!(1.5)).unwrap().declared_type,
            Some(DeclaredType::Number)
        );
        assert_eq!(
            infer_field("o", &json!({"a": 1})).unwrap().declared_type,
            Some(DeclaredType::Object)
        );
        assert_eq!(infer_field("s", &json!("x")).unwrap().declared_type, None);
        assert!(infer_field("z", &Value::Null).is_none());
    }
}
