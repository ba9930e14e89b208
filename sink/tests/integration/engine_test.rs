use serde_json::json;
use sink::schema::metadata::{BATCHED_AT, RECEIVED_AT, SEQUENCE, is_metadata_column};
use sink::schema::DdlOperation;
use sink::test_utils::fixtures::{
    activate_version, animals_schema, animals_table, find_row, record, run_to_completion,
    schema, string_cell, test_config, TEST_DATABASE,
};
use sink::types::{Cell, SqlType, TableName};
use telemetry::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn animals_load_end_to_end_with_late_extra_column() {
    init_test_tracing();

    let messages = vec![
        schema(
            "animals",
            json!({"properties": {"id": {"type": "integer"}, "name": {"type": "string"}}}),
            &["id"],
        ),
        record("animals", json!({"id": 1, "name": "cat"})),
        record("animals", json!({"id": 2, "name": "dog"})),
        activate_version("animals", 1),
        record("animals", json!({"id": 1, "name": "cat", "extra": "x"})),
    ];

    let (summary, destination, _) = run_to_completion(test_config(json!({})), messages).await;
    assert!(summary.is_success());

    let table = destination.table(&animals_table()).await.unwrap();
    let data_columns: Vec<&str> = table
        .columns
        .iter()
        .map(|column| column.name.as_str())
        .filter(|name| !is_metadata_column(name))
        .collect();
    assert_eq!(data_columns, vec!["id", "name", "extra"]);

    let rows = destination.table_rows(&animals_table()).await;
    assert_eq!(rows.len(), 2);
    assert_eq!(
        string_cell(find_row(&rows, "id", 1).unwrap(), "extra").as_deref(),
        Some("x")
    );
    assert_eq!(string_cell(find_row(&rows, "id", 2).unwrap(), "extra"), None);

    // The first activation of a table has nothing older to clean up.
    assert_eq!(destination.version(&animals_table()).await, Some(1));
    assert!(
        destination
            .ddl_log()
            .await
            .iter()
            .any(|operation| matches!(operation, DdlOperation::AddColumn { column, .. } if column.name == "extra"))
    );

    let report = summary.stream("animals").unwrap();
    assert_eq!(report.stats.received, 3);
    assert_eq!(report.stats.written, 3);
    assert_eq!(report.stats.activations, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn upsert_on_key_keeps_the_latest_values() {
    init_test_tracing();

    let messages = vec![
        schema("animals", animals_schema(), &["id"]),
        record("animals", json!({"id": 1, "name": "a"})),
        record("animals", json!({"id": 1, "name": "b"})),
    ];

    let (_, destination, _) = run_to_completion(test_config(json!({})), messages).await;

    let rows = destination.table_rows(&animals_table()).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(string_cell(&rows[0], "name").as_deref(), Some("b"));
}

#[tokio::test(flavor = "multi_thread")]
async fn upserts_span_batches() {
    init_test_tracing();

    let config = test_config(json!({"batch": {"max_rows": 1}}));
    let messages = vec![
        schema("animals", animals_schema(), &["id"]),
        record("animals", json!({"id": 1, "name": "a", "color": "red"})),
        record("animals", json!({"id": 1, "name": "b"})),
    ];

    let (summary, destination, _) = run_to_completion(config, messages).await;
    assert_eq!(summary.stream("animals").unwrap().stats.flushes, 2);

    let rows = destination.table_rows(&animals_table()).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(string_cell(&rows[0], "name").as_deref(), Some("b"));
    // Columns the later record does not carry are left untouched.
    assert_eq!(string_cell(&rows[0], "color").as_deref(), Some("red"));
}

#[tokio::test(flavor = "multi_thread")]
async fn streams_without_keys_append_duplicates() {
    init_test_tracing();

    let messages = vec![
        schema("events", json!({"properties": {"name": {"type": "string"}}}), &[]),
        record("events", json!({"name": "click"})),
        record("events", json!({"name": "click"})),
    ];

    let (summary, destination, _) = run_to_completion(test_config(json!({})), messages).await;
    assert!(summary.is_success());

    let rows = destination
        .table_rows(&TableName::new(TEST_DATABASE, "events"))
        .await;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| string_cell(row, "name").as_deref() == Some("click")));
}

#[tokio::test(flavor = "multi_thread")]
async fn any_of_declarations_map_to_the_widest_candidate() {
    init_test_tracing();

    let messages = vec![schema(
        "events",
        json!({"properties": {
            "id": {"type": "integer"},
            "created_at": {"anyOf": [{"type": "string", "format": "date-time"}, {"type": "null"}]},
            "tags": {"anyOf": [{"type": "array", "items": {"type": "string"}}, {"type": "string"}]},
            "code": {"type": ["string", "integer"]}
        }}),
        &["id"],
    )];

    let (_, destination, _) = run_to_completion(test_config(json!({})), messages).await;

    let table = destination
        .table(&TableName::new(TEST_DATABASE, "events"))
        .await
        .unwrap();
    assert_eq!(table.column("created_at").unwrap().sql_type, SqlType::Timestamp);
    assert_eq!(table.column("tags").unwrap().sql_type, SqlType::Json);
    assert_eq!(table.column("code").unwrap().sql_type, SqlType::Varchar(255));
}

#[tokio::test(flavor = "multi_thread")]
async fn stream_names_resolve_schema_and_table() {
    init_test_tracing();

    let messages = vec![
        schema("public-Users", json!({"properties": {"id": {"type": "integer"}}}), &["id"]),
        record("public-Users", json!({"id": 1})),
    ];

    let (summary, destination, _) = run_to_completion(test_config(json!({})), messages).await;

    let table_name = TableName::new("public", "users");
    assert_eq!(
        summary.stream("public-Users").unwrap().table.as_ref(),
        Some(&table_name)
    );
    assert_eq!(destination.table_rows(&table_name).await.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_records_are_skipped_and_counted() {
    init_test_tracing();

    let schema_with_required = json!({
        "properties": {"id": {"type": "integer"}, "name": {"type": "string"}},
        "required": ["name"]
    });
    let messages = vec![
        schema("animals", schema_with_required, &["id"]),
        record("animals", json!({"id": "not a number", "name": "cat"})),
        record("animals", json!({"name": "nameless"})),
        record("animals", json!({"id": null, "name": "null key"})),
        record("animals", json!({"id": 4})),
        record("animals", json!({"id": 5, "name": "dog"})),
    ];

    let (summary, destination, _) = run_to_completion(test_config(json!({})), messages).await;
    assert!(summary.is_success());

    let stats = summary.stream("animals").unwrap().stats;
    assert_eq!(stats.malformed, 4);
    assert_eq!(stats.received, 1);
    assert_eq!(stats.written, 1);

    let rows = destination.table_rows(&animals_table()).await;
    assert_eq!(rows.len(), 1);
    assert!(find_row(&rows, "id", 5).is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn undeclared_null_values_do_not_create_columns() {
    init_test_tracing();

    let messages = vec![
        schema("animals", animals_schema(), &["id"]),
        record("animals", json!({"id": 1, "nickname": null})),
        record("animals", json!({"id": 2, "legs": 4})),
    ];

    let (_, destination, _) = run_to_completion(test_config(json!({})), messages).await;

    let table = destination.table(&animals_table()).await.unwrap();
    assert!(!table.has_column("nickname"));
    assert_eq!(table.column("legs").unwrap().sql_type, SqlType::BigInt);

    let rows = destination.table_rows(&animals_table()).await;
    assert_eq!(find_row(&rows, "id", 1).unwrap().get("legs"), Some(&Cell::Null));
    assert_eq!(
        find_row(&rows, "id", 2).unwrap().get("legs"),
        Some(&Cell::I64(4))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn undeclared_columns_widen_to_text_for_values_of_another_type() {
    init_test_tracing();

    let messages = vec![
        schema("animals", animals_schema(), &["id"]),
        record("animals", json!({"id": 1, "extra": 5})),
        record("animals", json!({"id": 2, "extra": "x"})),
        record("animals", json!({"id": 3, "extra": {"a": 1}})),
    ];

    let (summary, destination, _) = run_to_completion(test_config(json!({})), messages).await;
    let report = summary.stream("animals").unwrap();
    assert_eq!(report.stats.written, 3);
    assert_eq!(report.stats.malformed, 0);

    let table = destination.table(&animals_table()).await.unwrap();
    assert_eq!(table.column("extra").unwrap().sql_type, SqlType::Text);

    let rows = destination.table_rows(&animals_table()).await;
    assert_eq!(
        string_cell(find_row(&rows, "id", 2).unwrap(), "extra").as_deref(),
        Some("x")
    );
    assert!(string_cell(find_row(&rows, "id", 3).unwrap(), "extra").is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn flattening_expands_declared_objects() {
    init_test_tracing();

    let config = test_config(json!({"flattening_enabled": true, "flattening_max_depth": 1}));
    let messages = vec![
        schema(
            "people",
            json!({"properties": {
                "id": {"type": "integer"},
                "address": {"type": "object", "properties": {
                    "city": {"type": "string"},
                    "geo": {"type": "object", "properties": {"lat": {"type": "number"}}}
                }}
            }}),
            &["id"],
        ),
        record(
            "people",
            json!({"id": 1, "address": {"city": "Oslo", "geo": {"lat": 59.9}}}),
        ),
    ];

    let (_, destination, _) = run_to_completion(config, messages).await;

    let table_name = TableName::new(TEST_DATABASE, "people");
    let table = destination.table(&table_name).await.unwrap();
    assert!(!table.has_column("address"));
    assert_eq!(table.column("address__geo").unwrap().sql_type, SqlType::Json);

    let rows = destination.table_rows(&table_name).await;
    assert_eq!(string_cell(&rows[0], "address__city").as_deref(), Some("Oslo"));
    assert_eq!(
        rows[0].get("address__geo"),
        Some(&Cell::Json(r#"{"lat":59.9}"#.to_string()))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn record_metadata_is_written_when_enabled() {
    init_test_tracing();

    let config = test_config(json!({"add_record_metadata": true}));
    let messages = vec![
        schema("animals", animals_schema(), &["id"]),
        record("animals", json!({"id": 1, "name": "cat"})),
    ];

    let (_, destination, _) = run_to_completion(config, messages).await;

    let rows = destination.table_rows(&animals_table()).await;
    let row = &rows[0];
    assert_eq!(row.get(SEQUENCE), Some(&Cell::I64(2)));
    assert!(matches!(row.get(BATCHED_AT), Some(Cell::Timestamp(_))));
    assert!(matches!(row.get(RECEIVED_AT), Some(Cell::Timestamp(_))));
}
