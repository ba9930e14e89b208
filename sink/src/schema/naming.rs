use mysql::types::MAX_IDENTIFIER_LENGTH;

use crate::types::TableName;

/// Conforms a source name into a MySQL identifier.
///
/// The result is snake case, holds only `[a-z0-9_]`, never starts with a digit and is at most
/// 64 characters long. `camelCase` and `HTTPServer` split on case changes, while `-`, `.` and
/// whitespace become underscores.
pub fn conform_name(name: &str) -> String {
    let chars: Vec<char> = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') || c.is_whitespace())
        .collect();

    let mut conformed = String::with_capacity(chars.len() + 4);
    for (index, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && index > 0 {
            let previous = chars[index - 1];
            let next_is_lower = chars
                .get(index + 1)
                .is_some_and(|next| next.is_ascii_lowercase());
            let splits = previous.is_ascii_lowercase()
                || previous.is_ascii_digit()
                || (previous.is_ascii_uppercase() && next_is_lower);

            if splits && !conformed.ends_with('_') {
                conformed.push('_');
            }
        }

        if c == '-' || c == '.' || c.is_whitespace() {
            conformed.push('_');
        } else {
            conformed.push(c.to_ascii_lowercase());
        }
    }

    if conformed.is_empty() {
        conformed.push('_');
    }

    if conformed.starts_with(|c: char| c.is_ascii_digit()) {
        conformed.insert(0, '_');
    }

    conformed.truncate(MAX_IDENTIFIER_LENGTH);
    conformed
}

/// Resolves the destination table of a stream.
///
/// The table name is the conformed last `-` separated part of the stream name. The schema is
/// `default_target_schema` when configured, else the part before the table name when the
/// stream name has two or three parts (`schema-table`, `catalog-schema-table`), else the
/// connection database.
pub fn table_name_for_stream(
    stream: &str,
    default_target_schema: Option<&str>,
    database: &str,
) -> TableName {
    let parts: Vec<&str> = stream.split('-').collect();
    let table = parts.last().copied().unwrap_or(stream);

    let schema = match default_target_schema {
        Some(schema) => schema.to_string(),
        None if matches!(parts.len(), 2 | 3) => conform_name(parts[parts.len() - 2]),
        None => database.to_string(),
    };

    TableName::new(schema, conform_name(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conforms_to_snake_case() {
        assert_eq!(conform_name("camelCase"), "camel_case");
        assert_eq!(conform_name("HTTPServer"), "http_server");
        assert_eq!(conform_name("already_snake"), "already_snake");
        assert_eq!(conform_name("Name With Spaces"), "name_with_spaces");
        assert_eq!(conform_name("dotted.name-here"), "dotted_name_here");
    }

    #[test]
    fn strips_invalid_characters() {
        assert_eq!(conform_name("price($)"), "price");
        assert_eq!(conform_name("naïve"), "nave");
        assert_eq!(conform_name("$$$"), "_");
    }

    #[test]
    fn prefixes_leading_digits() {
        assert_eq!(conform_name("1st_place"), "_1st_place");
        assert_eq!(conform_name("2020Sales"), "_2020_sales");
    }

    #[test]
    fn keeps_flattening_separator_and_metadata_prefix() {
        assert_eq!(conform_name("address__city"), "address__city");
        assert_eq!(conform_name("_sdc_deleted_at"), "_sdc_deleted_at");
    }

    #[test]
    fn truncates_to_identifier_length() {
        let long = "a".repeat(100);
        assert_eq!(conform_name(&long).len(), MAX_IDENTIFIER_LENGTH);
    }

    #[test]
    fn resolves_table_names_from_stream_names() {
        assert_eq!(
            table_name_for_stream("animals", None, "melty"),
            TableName::new("melty", "animals")
        );
        assert_eq!(
            table_name_for_stream("public-Users", None, "melty"),
            TableName::new("public", "users")
        );
        assert_eq!(
            table_name_for_stream("db-sales-Orders", None, "melty"),
            TableName::new("sales", "orders")
        );
        assert_eq!(
            table_name_for_stream("public-users", Some("target"), "melty"),
            TableName::new("target", "users")
        );
        assert_eq!(
            table_name_for_stream("a-b-c-d", None, "melty"),
            TableName::new("melty", "d")
        );
    }
}
