use serde_json::json;
use sink::error::ErrorKind;
use sink::test_utils::fixtures::{
    animals_schema_with_extra, animals_table, find_row, record, run_to_completion, schema,
    string_cell, test_config,
};
use sink::types::{Cell, SqlType};
use telemetry::init_test_tracing;

fn named(max_length: u32) -> serde_json::Value {
    json!({"properties": {
        "id": {"type": "integer"},
        "name": {"type": "string", "maxLength": max_length}
    }})
}

#[tokio::test(flavor = "multi_thread")]
async fn columns_are_the_union_of_every_schema_seen() {
    init_test_tracing();

    let messages = vec![
        schema("animals", named(10), &["id"]),
        record("animals", json!({"id": 1, "name": "cat"})),
        schema(
            "animals",
            json!({"properties": {"id": {"type": "integer"}, "legs": {"type": "integer"}}}),
            &["id"],
        ),
        record("animals", json!({"id": 2, "legs": 4})),
        schema("animals", named(40), &["id"]),
        record("animals", json!({"id": 3, "name": "a rather long name for a cow"})),
    ];

    let (summary, destination, _) = run_to_completion(test_config(json!({})), messages).await;
    assert!(summary.is_success());

    let table = destination.table(&animals_table()).await.unwrap();
    assert_eq!(table.column("name").unwrap().sql_type, SqlType::Varchar(40));
    assert!(table.column("name").unwrap().nullable);
    assert_eq!(table.column("legs").unwrap().sql_type, SqlType::BigInt);

    let rows = destination.table_rows(&animals_table()).await;
    assert_eq!(rows.len(), 3);
    assert_eq!(string_cell(find_row(&rows, "id", 1).unwrap(), "name").as_deref(), Some("cat"));
    assert_eq!(find_row(&rows, "id", 2).unwrap().get("legs"), Some(&Cell::I64(4)));
    assert_eq!(find_row(&rows, "id", 3).unwrap().get("legs"), Some(&Cell::Null));
}

#[tokio::test(flavor = "multi_thread")]
async fn columns_never_narrow() {
    init_test_tracing();

    let messages = vec![
        schema("animals", named(40), &["id"]),
        schema("animals", named(10), &["id"]),
        record("animals", json!({"id": 1, "name": "longer than ten characters"})),
    ];

    let (summary, destination, _) = run_to_completion(test_config(json!({})), messages).await;
    assert_eq!(summary.stream("animals").unwrap().stats.written, 1);

    let table = destination.table(&animals_table()).await.unwrap();
    assert_eq!(table.column("name").unwrap().sql_type, SqlType::Varchar(40));
}

#[tokio::test(flavor = "multi_thread")]
async fn integer_columns_widen_to_decimal() {
    init_test_tracing();

    let messages = vec![
        schema(
            "prices",
            json!({"properties": {"id": {"type": "integer"}, "amount": {"type": "integer"}}}),
            &["id"],
        ),
        record("prices", json!({"id": 1, "amount": 3})),
        schema(
            "prices",
            json!({"properties": {"id": {"type": "integer"}, "amount": {"type": "number"}}}),
            &["id"],
        ),
        record("prices", json!({"id": 2, "amount": 3.25})),
    ];

    let (summary, destination, _) = run_to_completion(test_config(json!({})), messages).await;
    assert!(summary.is_success());

    let table_name = sink::types::TableName::new("melty", "prices");
    let table = destination.table(&table_name).await.unwrap();
    assert!(matches!(
        table.column("amount").unwrap().sql_type,
        SqlType::Decimal { .. }
    ));
    assert_eq!(destination.table_rows(&table_name).await.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn incompatible_types_fail_the_stream_with_a_conflict() {
    init_test_tracing();

    let messages = vec![
        schema(
            "events",
            json!({"properties": {"id": {"type": "integer"}, "payload": {"type": "string", "format": "date"}}}),
            &["id"],
        ),
        schema(
            "events",
            json!({"properties": {"id": {"type": "integer"}, "payload": {"type": "object"}}}),
            &["id"],
        ),
    ];

    let (summary, _, _) = run_to_completion(test_config(json!({})), messages).await;

    let failure = summary.stream("events").unwrap().failure.clone().unwrap();
    assert_eq!(failure.operation, "apply schema");
    assert_eq!(failure.error.kind(), ErrorKind::SchemaConflict);
}

#[tokio::test(flavor = "multi_thread")]
async fn schema_changes_apply_before_buffered_rows_of_the_new_shape_flush() {
    init_test_tracing();

    let messages = vec![
        schema("animals", named(10), &["id"]),
        record("animals", json!({"id": 1, "name": "cat"})),
        schema("animals", animals_schema_with_extra(), &["id"]),
        record("animals", json!({"id": 2, "name": "dog", "extra": "y"})),
    ];

    let (summary, destination, _) = run_to_completion(test_config(json!({})), messages).await;
    assert_eq!(summary.stream("animals").unwrap().stats.flushes, 1);

    let rows = destination.table_rows(&animals_table()).await;
    assert_eq!(string_cell(find_row(&rows, "id", 1).unwrap(), "extra"), None);
    assert_eq!(
        string_cell(find_row(&rows, "id", 2).unwrap(), "extra").as_deref(),
        Some("y")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn short_varchar_columns_widen_for_timestamps() {
    init_test_tracing();

    let messages = vec![
        schema("people", json!({"properties": {
            "id": {"type": "integer"},
            "born": {"type": "string", "maxLength": 10}
        }}), &["id"]),
        schema("people", json!({"properties": {
            "id": {"type": "integer"},
            "born": {"type": "string", "format": "date-time"}
        }}), &["id"]),
        record("people", json!({"id": 1, "born": "2024-01-01T00:00:00Z"})),
    ];

    let (summary, destination, _) = run_to_completion(test_config(json!({})), messages).await;
    let report = summary.stream("people").unwrap();
    assert_eq!(report.stats.written, 1);
    assert_eq!(report.stats.malformed, 0);

    let table_name = sink::types::TableName::new("melty", "people");
    let table = destination.table(&table_name).await.unwrap();
    assert_eq!(table.column("born").unwrap().sql_type, SqlType::Varchar(80));

    let rows = destination.table_rows(&table_name).await;
    assert!(string_cell(find_row(&rows, "id", 1).unwrap(), "born").is_some());
}
