use serde_json::json;
use sink::destination::memory::FaultTarget;
use sink::error::ErrorKind;
use sink::test_utils::fixtures::{
    accept_all, animals_schema, animals_table, memory_engine, record, run_to_completion, schema,
    state, test_config, TEST_DATABASE,
};
use sink::types::TableName;
use telemetry::init_test_tracing;

fn plants_table() -> TableName {
    TableName::new(TEST_DATABASE, "plants")
}

#[tokio::test(flavor = "multi_thread")]
async fn record_before_schema_fails_only_its_stream() {
    init_test_tracing();

    let messages = vec![
        record("ghosts", json!({"id": 1})),
        schema("animals", animals_schema(), &["id"]),
        record("animals", json!({"id": 1, "name": "cat"})),
        record("ghosts", json!({"id": 2})),
    ];

    let (summary, destination, _) = run_to_completion(test_config(json!({})), messages).await;
    assert!(!summary.is_success());

    let ghosts = summary.stream("ghosts").unwrap();
    let failure = ghosts.failure.as_ref().unwrap();
    assert_eq!(failure.error.kind(), ErrorKind::MissingSchema);
    assert_eq!(failure.operation, "accept record");
    assert_eq!(failure.lost_from, 1);

    let animals = summary.stream("animals").unwrap();
    assert!(!animals.is_failed());
    assert_eq!(destination.table_rows(&animals_table()).await.len(), 1);

    let err = summary.into_result().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StreamFailed);
    assert!(err.to_string().contains("ghosts"));
}

#[tokio::test(flavor = "multi_thread")]
async fn write_failure_stops_only_the_failing_stream() {
    init_test_tracing();

    let (mut engine, destination, store) = memory_engine(test_config(json!({}))).await;
    accept_all(
        &mut engine,
        [
            schema("animals", animals_schema(), &["id"]),
            schema("plants", json!({"properties": {"id": {"type": "integer"}}}), &["id"]),
        ],
    )
    .await
    .unwrap();

    destination
        .reject_writes_to(&animals_table(), ErrorKind::ConstraintViolation)
        .await;

    accept_all(
        &mut engine,
        [
            record("animals", json!({"id": 1, "name": "cat"})),
            record("plants", json!({"id": 1})),
        ],
    )
    .await
    .unwrap();
    let summary = engine.finish().await.unwrap();

    let animals = summary.stream("animals").unwrap();
    let failure = animals.failure.as_ref().unwrap();
    assert_eq!(failure.operation, "flush");
    assert_eq!(failure.error.kind(), ErrorKind::ConstraintViolation);
    assert_eq!(failure.lost_from, 3);

    assert_eq!(summary.stream("plants").unwrap().stats.written, 1);
    assert!(destination.table_rows(&animals_table()).await.is_empty());
    assert_eq!(destination.table_rows(&plants_table()).await.len(), 1);
    assert_eq!(store.history().await, vec![("plants".to_string(), 4)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn records_after_a_failure_are_dropped() {
    init_test_tracing();

    let config = test_config(json!({"batch": {"max_rows": 1}}));
    let (mut engine, destination, _) = memory_engine(config).await;
    engine
        .accept(schema("animals", animals_schema(), &["id"]))
        .await
        .unwrap();

    destination
        .fail_next(FaultTarget::WriteBatch, ErrorKind::ValueRejected, 1)
        .await;

    accept_all(
        &mut engine,
        [
            record("animals", json!({"id": 1, "name": "cat"})),
            record("animals", json!({"id": 2, "name": "dog"})),
            record("animals", json!({"id": 3, "name": "cow"})),
        ],
    )
    .await
    .unwrap();
    let summary = engine.finish().await.unwrap();

    let report = summary.stream("animals").unwrap();
    assert!(report.is_failed());
    assert_eq!(report.failure.as_ref().unwrap().error.kind(), ErrorKind::ValueRejected);
    assert_eq!(report.failure.as_ref().unwrap().lost_from, 2);
    assert_eq!(report.stats.written, 0);
    assert_eq!(
        report.stats.received + report.stats.dropped,
        3,
        "every record is either buffered before the failure or dropped after it"
    );
    assert!(destination.table_rows(&animals_table()).await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_write_errors_are_retried() {
    init_test_tracing();

    let (mut engine, destination, _) = memory_engine(test_config(json!({}))).await;
    engine
        .accept(schema("animals", animals_schema(), &["id"]))
        .await
        .unwrap();
    destination
        .fail_next(FaultTarget::WriteBatch, ErrorKind::DestinationDeadlock, 2)
        .await;

    engine
        .accept(record("animals", json!({"id": 1, "name": "cat"})))
        .await
        .unwrap();
    let summary = engine.finish().await.unwrap();

    assert!(summary.is_success());
    assert_eq!(destination.write_attempts().await, 3);
    assert_eq!(destination.table_rows(&animals_table()).await.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn retry_exhaustion_is_fatal_for_the_stream() {
    init_test_tracing();

    let (mut engine, destination, _) = memory_engine(test_config(json!({}))).await;
    engine
        .accept(schema("animals", animals_schema(), &["id"]))
        .await
        .unwrap();
    destination
        .fail_next(FaultTarget::WriteBatch, ErrorKind::DestinationLockTimeout, 10)
        .await;

    engine
        .accept(record("animals", json!({"id": 1, "name": "cat"})))
        .await
        .unwrap();
    let summary = engine.finish().await.unwrap();

    let failure = summary.stream("animals").unwrap().failure.clone().unwrap();
    assert_eq!(failure.error.kind(), ErrorKind::FatalWriteError);
    assert_eq!(destination.write_attempts().await, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_mid_batch_leaves_the_table_unchanged() {
    init_test_tracing();

    let (mut engine, destination, _) = memory_engine(test_config(json!({}))).await;
    engine
        .accept(schema("animals", animals_schema(), &["id"]))
        .await
        .unwrap();
    destination.fail_next_write_after(1).await;

    accept_all(
        &mut engine,
        [
            record("animals", json!({"id": 1, "name": "cat"})),
            record("animals", json!({"id": 2, "name": "dog"})),
        ],
    )
    .await
    .unwrap();
    let summary = engine.finish().await.unwrap();

    assert!(summary.stream("animals").unwrap().is_failed());
    assert!(destination.table_rows(&animals_table()).await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn fail_fast_aborts_the_run() {
    init_test_tracing();

    let (mut engine, _, _) = memory_engine(test_config(json!({"fail_fast": true}))).await;

    let err = engine
        .accept(record("animals", json!({"id": 1})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StreamFailed);
    assert!(err.to_string().contains("animals"));
}

#[tokio::test(flavor = "multi_thread")]
async fn state_after_a_failed_stream_is_never_acknowledged() {
    init_test_tracing();

    let (mut engine, destination, _) = memory_engine(test_config(json!({}))).await;
    let emitted = accept_all(
        &mut engine,
        [
            schema("animals", animals_schema(), &["id"]),
            state(json!({"bookmark": 1})),
        ],
    )
    .await
    .unwrap();
    assert_eq!(emitted, vec![json!({"bookmark": 1})]);

    destination
        .fail_next(FaultTarget::WriteBatch, ErrorKind::ConstraintViolation, 1)
        .await;
    let emitted = accept_all(
        &mut engine,
        [
            record("animals", json!({"id": 1, "name": "cat"})),
            state(json!({"bookmark": 2})),
        ],
    )
    .await
    .unwrap();
    assert!(emitted.is_empty());

    let summary = engine.finish().await.unwrap();
    assert_eq!(summary.final_state, None);
}
