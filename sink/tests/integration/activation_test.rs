use serde_json::json;
use sink::checkpoint::memory::MemoryCheckpointStore;
use sink::engine::Engine;
use sink::schema::metadata::{DELETED_AT, TABLE_VERSION};
use sink::test_utils::fixtures::{
    accept_all, activate_version, animals_schema, animals_table, find_row, memory_engine,
    record, run_to_completion, schema, test_config, versioned_record,
};
use sink::types::Cell;
use telemetry::init_test_tracing;

fn two_snapshots() -> Vec<sink::protocol::Message> {
    vec![
        schema("animals", animals_schema(), &["id"]),
        versioned_record("animals", json!({"id": 1, "name": "cat"}), 1),
        versioned_record("animals", json!({"id": 2, "name": "dog"}), 1),
        activate_version("animals", 1),
        versioned_record("animals", json!({"id": 1, "name": "cat"}), 2),
        activate_version("animals", 2),
    ]
}

#[tokio::test(flavor = "multi_thread")]
async fn first_activation_deletes_nothing() {
    init_test_tracing();

    let messages = vec![
        schema("animals", animals_schema(), &["id"]),
        versioned_record("animals", json!({"id": 1, "name": "cat"}), 1),
        versioned_record("animals", json!({"id": 2, "name": "dog"}), 1),
        activate_version("animals", 1),
    ];

    let (summary, destination, _) =
        run_to_completion(test_config(json!({"hard_delete": true})), messages).await;
    assert!(summary.is_success());

    assert_eq!(destination.table_rows(&animals_table()).await.len(), 2);
    assert_eq!(destination.version(&animals_table()).await, Some(1));
}

#[tokio::test(flavor = "multi_thread")]
async fn newer_version_hard_deletes_rows_of_older_versions() {
    init_test_tracing();

    let (summary, destination, _) =
        run_to_completion(test_config(json!({"hard_delete": true})), two_snapshots()).await;
    assert_eq!(summary.stream("animals").unwrap().stats.activations, 2);

    let rows = destination.table_rows(&animals_table()).await;
    assert_eq!(rows.len(), 1);
    let row = find_row(&rows, "id", 1).unwrap();
    assert_eq!(row.get(TABLE_VERSION), Some(&Cell::I64(2)));
    assert_eq!(destination.version(&animals_table()).await, Some(2));
}

#[tokio::test(flavor = "multi_thread")]
async fn newer_version_soft_deletes_rows_of_older_versions() {
    init_test_tracing();

    let (_, destination, _) =
        run_to_completion(test_config(json!({"hard_delete": false})), two_snapshots()).await;

    let rows = destination.table_rows(&animals_table()).await;
    assert_eq!(rows.len(), 2);
    assert_eq!(
        find_row(&rows, "id", 1).unwrap().get(DELETED_AT),
        Some(&Cell::Null)
    );
    assert!(matches!(
        find_row(&rows, "id", 2).unwrap().get(DELETED_AT),
        Some(Cell::Timestamp(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn replayed_activation_is_a_no_op() {
    init_test_tracing();

    let mut messages = two_snapshots();
    messages.push(activate_version("animals", 2));
    messages.push(activate_version("animals", 1));

    let (summary, destination, _) =
        run_to_completion(test_config(json!({"hard_delete": true})), messages).await;
    assert!(summary.is_success());
    assert_eq!(summary.stream("animals").unwrap().stats.activations, 4);

    assert_eq!(destination.table_rows(&animals_table()).await.len(), 1);
    assert_eq!(destination.version(&animals_table()).await, Some(2));
}

#[tokio::test(flavor = "multi_thread")]
async fn committed_versions_survive_a_restart() {
    init_test_tracing();

    let config = test_config(json!({"hard_delete": true}));
    let (_, destination, _) = run_to_completion(config.clone(), two_snapshots()).await;

    // A second run over the same destination replays the last activation.
    let mut engine = Engine::new(config, destination.clone(), MemoryCheckpointStore::new())
        .await
        .unwrap();
    accept_all(
        &mut engine,
        [
            schema("animals", animals_schema(), &["id"]),
            activate_version("animals", 2),
        ],
    )
    .await
    .unwrap();
    let summary = engine.finish().await.unwrap();
    assert!(summary.is_success());

    let rows = destination.table_rows(&animals_table()).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(destination.version(&animals_table()).await, Some(2));
}

#[tokio::test(flavor = "multi_thread")]
async fn untagged_records_after_activation_carry_the_committed_version() {
    init_test_tracing();

    let (mut engine, destination, _) = memory_engine(test_config(json!({}))).await;
    accept_all(
        &mut engine,
        [
            schema("animals", animals_schema(), &["id"]),
            versioned_record("animals", json!({"id": 1, "name": "cat"}), 7),
            activate_version("animals", 7),
            record("animals", json!({"id": 2, "name": "dog"})),
        ],
    )
    .await
    .unwrap();
    engine.finish().await.unwrap();

    let rows = destination.table_rows(&animals_table()).await;
    assert_eq!(
        find_row(&rows, "id", 2).unwrap().get(TABLE_VERSION),
        Some(&Cell::I64(7))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn activation_before_schema_fails_the_stream() {
    init_test_tracing();

    let (summary, _, _) = run_to_completion(
        test_config(json!({})),
        [activate_version("animals", 1)],
    )
    .await;

    let failure = summary.stream("animals").unwrap().failure.as_ref().unwrap();
    assert_eq!(failure.operation, "activate version");
    assert_eq!(failure.error.kind(), sink::error::ErrorKind::MissingSchema);
}
