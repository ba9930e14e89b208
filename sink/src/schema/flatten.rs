//! Expansion of nested objects into `parent__child` columns.
//!
//! Field schemas and record values are flattened by the same rule so that every flattened
//! record key lines up with a flattened column. Only objects with declared properties are
//! expanded. Everything deeper than the configured depth stays a single JSON value.

use mysql::types::MAX_IDENTIFIER_LENGTH;
use serde_json::{Map, Value};

use crate::schema::naming::conform_name;
use crate::types::FieldSchema;

/// Separator placed between a parent and a child name.
pub const FLATTENING_SEPARATOR: &str = "__";

/// Flattens and conforms the fields of a stream.
///
/// With `max_depth == 0` fields are only conformed. Returned fields carry their column name.
/// When two fields conform to the same column name the first one wins.
pub fn flatten_fields(fields: &[FieldSchema], max_depth: usize) -> Vec<FieldSchema> {
    let mut flattened = Vec::with_capacity(fields.len());
    flatten_fields_into(fields, None, 0, max_depth, false, &mut flattened);
    flattened
}

fn flatten_fields_into(
    fields: &[FieldSchema],
    prefix: Option<&str>,
    depth: usize,
    max_depth: usize,
    parent_nullable: bool,
    out: &mut Vec<FieldSchema>,
) {
    for field in fields {
        let column = column_name(prefix, &field.name);

        if field.has_properties() && depth < max_depth {
            flatten_fields_into(
                &field.properties,
                Some(&column),
                depth + 1,
                max_depth,
                parent_nullable || field.nullable,
                out,
            );
            continue;
        }

        if out.iter().any(|existing| existing.name == column) {
            continue;
        }

        let mut flattened = field.clone();
        flattened.name = column;
        if prefix.is_some() {
            flattened.nullable = flattened.nullable || parent_nullable;
            flattened.required = false;
        }
        out.push(flattened);
    }
}

/// Flattens and conforms the keys of a record, guided by the declared fields.
///
/// Objects are expanded only where the matching declared field is an object with properties,
/// so undeclared objects stay single JSON values.
pub fn flatten_record(
    data: &Map<String, Value>,
    fields: &[FieldSchema],
    max_depth: usize,
) -> Map<String, Value> {
    let mut flattened = Map::with_capacity(data.len());
    flatten_record_into(data, fields, None, 0, max_depth, &mut flattened);
    flattened
}

fn flatten_record_into(
    data: &Map<String, Value>,
    fields: &[FieldSchema],
    prefix: Option<&str>,
    depth: usize,
    max_depth: usize,
    out: &mut Map<String, Value>,
) {
    for (key, value) in data {
        let column = column_name(prefix, key);
        let declared = fields.iter().find(|field| &field.name == key);

        if let (Value::Object(nested), Some(field)) = (value, declared)
            && field.has_properties()
            && depth < max_depth
        {
            flatten_record_into(nested, &field.properties, Some(&column), depth + 1, max_depth, out);
            continue;
        }

        if !out.contains_key(&column) {
            out.insert(column, value.clone());
        }
    }
}

fn column_name(prefix: Option<&str>, name: &str) -> String {
    let mut column = match prefix {
        Some(prefix) => format!("{prefix}{FLATTENING_SEPARATOR}{}", conform_name(name)),
        None => conform_name(name),
    };
    column.truncate(MAX_IDENTIFIER_LENGTH);
    column
}
