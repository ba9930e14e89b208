//! Interpretation of the JSON schema carried by SCHEMA messages.

use serde_json::{Map, Value};

use crate::bail;
use crate::error::{ErrorKind, SinkResult};
use crate::protocol::SchemaMessage;
use crate::types::{DeclaredType, FieldSchema, FormatHint, StreamSchema};

/// Builds a [`StreamSchema`] revision from a SCHEMA message.
pub fn parse_stream_schema(message: &SchemaMessage, revision: u64) -> SinkResult<StreamSchema> {
    let Some(schema) = message.schema.as_object() else {
        bail!(
            ErrorKind::InvalidSchema,
            "Stream schema is not a JSON object",
            format!("stream `{}`", message.stream)
        );
    };

    Ok(StreamSchema {
        stream: message.stream.clone(),
        fields: parse_properties(schema),
        key_properties: message.key_properties.clone().unwrap_or_default(),
        revision,
    })
}

/// Parses the `properties` of an object schema, flagging the `required` ones.
fn parse_properties(schema: &Map<String, Value>) -> Vec<FieldSchema> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|required| required.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };

    properties
        .iter()
        .map(|(name, definition)| {
            let mut field = parse_field(name, definition);
            field.required = required.contains(&name.as_str());
            field
        })
        .collect()
}

/// Parses one property. `null` only toggles nullability, and when several types remain the
/// widest one by [`precedence`] is kept.
fn parse_field(name: &str, definition: &Value) -> FieldSchema {
    let mut candidates = Vec::new();
    let mut nullable = false;
    collect_candidates(name, definition, &mut candidates, &mut nullable);

    let mut field = candidates
        .into_iter()
        .max_by_key(precedence)
        .unwrap_or_else(|| FieldSchema::new(name, None));
    field.nullable = nullable || field.nullable;
    field
}

fn collect_candidates(
    name: &str,
    definition: &Value,
    candidates: &mut Vec<FieldSchema>,
    nullable: &mut bool,
) {
    let Some(definition) = definition.as_object() else {
        candidates.push(FieldSchema::new(name, None));
        return;
    };

    let alternatives = definition
        .get("anyOf")
        .or_else(|| definition.get("oneOf"))
        .and_then(Value::as_array);
    if let Some(alternatives) = alternatives {
        for alternative in alternatives {
            collect_candidates(name, alternative, candidates, nullable);
        }
        return;
    }

    let type_names: Vec<&str> = match definition.get("type") {
        Some(Value::String(type_name)) => vec![type_name.as_str()],
        Some(Value::Array(type_names)) => type_names.iter().filter_map(Value::as_str).collect(),
        _ if definition.contains_key("properties") => vec!["object"],
        _ => Vec::new(),
    };

    if type_names.is_empty() {
        candidates.push(FieldSchema::new(name, None));
        return;
    }

    for type_name in type_names {
        if type_name == "null" {
            *nullable = true;
            continue;
        }

        candidates.push(candidate(name, type_name, definition));
    }
}

fn candidate(name: &str, type_name: &str, definition: &Map<String, Value>) -> FieldSchema {
    let Some(declared_type) = DeclaredType::from_json_schema(type_name) else {
        return FieldSchema::new(name, None);
    };

    let mut field = FieldSchema::new(name, Some(declared_type)).not_null();

    match declared_type {
        DeclaredType::String => {
            if let Some(format) = definition.get("format").and_then(Value::as_str) {
                let format = FormatHint::parse(format);
                if format == FormatHint::DateTime {
                    field.declared_type = Some(DeclaredType::Timestamp);
                }
                field.format = Some(format);
            }
            field.max_length = definition
                .get("maxLength")
                .and_then(Value::as_u64)
                .map(|length| u32::try_from(length).unwrap_or(u32::MAX));
        }
        DeclaredType::Integer => {
            field.minimum = definition
                .get("minimum")
                .and_then(|minimum| bound(minimum, f64::floor));
            field.maximum = definition
                .get("maximum")
                .and_then(|maximum| bound(maximum, f64::ceil));
        }
        DeclaredType::Object => {
            field.properties = parse_properties(definition);
        }
        _ => {}
    }

    field
}

fn bound(value: &Value, round: fn(f64) -> f64) -> Option<i64> {
    value.as_i64().or_else(|| {
        let rounded = round(value.as_f64()?);
        (rounded >= i64::MIN as f64 && rounded < i64::MAX as f64).then_some(rounded as i64)
    })
}

/// Rank of a candidate type when a field allows several. Higher ranks hold every value of
/// lower ones as text.
fn precedence(field: &FieldSchema) -> u8 {
    match (field.declared_type, &field.format) {
        (None, _) => 9,
        (Some(DeclaredType::Object | DeclaredType::Array), _) => 8,
        (Some(DeclaredType::String), Some(FormatHint::Date)) => 5,
        (Some(DeclaredType::String), Some(FormatHint::Time)) => 4,
        (Some(DeclaredType::String), _) => 7,
        (Some(DeclaredType::Timestamp), _) => 6,
        (Some(DeclaredType::Number), _) => 3,
        (Some(DeclaredType::Integer), _) => 2,
        (Some(DeclaredType::Boolean), _) => 1,
    }
}
