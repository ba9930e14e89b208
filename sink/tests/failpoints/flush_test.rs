use serde_json::json;
use sink::error::ErrorKind;
use sink::failpoints::{FLUSH_BEFORE_CHECKPOINT, WRITER_BEFORE_WRITE};
use sink::test_utils::failpoints::ConfiguredFailpoints;
use sink::test_utils::fixtures::{
    accept_all, animals_schema, animals_table, memory_engine, record, schema, state, test_config,
};
use telemetry::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn writer_retries_timed_errors_until_the_write_succeeds() {
    init_test_tracing();
    let _scenario = ConfiguredFailpoints::setup(&[(WRITER_BEFORE_WRITE, "2*return(timed_retry)")]);

    let (mut engine, destination, _) = memory_engine(test_config(json!({}))).await;
    accept_all(
        &mut engine,
        [
            schema("animals", animals_schema(), &["id"]),
            record("animals", json!({"id": 1, "name": "cat"})),
        ],
    )
    .await
    .unwrap();
    let summary = engine.finish().await.unwrap();

    assert!(summary.is_success());
    // Failed attempts never reached the destination.
    assert_eq!(destination.write_attempts().await, 1);
    assert_eq!(destination.table_rows(&animals_table()).await.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn writer_gives_up_on_errors_that_cannot_be_retried() {
    init_test_tracing();
    let _scenario = ConfiguredFailpoints::setup(&[(WRITER_BEFORE_WRITE, "return(no_retry)")]);

    let (mut engine, destination, _) = memory_engine(test_config(json!({}))).await;
    accept_all(
        &mut engine,
        [
            schema("animals", animals_schema(), &["id"]),
            record("animals", json!({"id": 1, "name": "cat"})),
        ],
    )
    .await
    .unwrap();
    let summary = engine.finish().await.unwrap();

    let failure = summary.stream("animals").unwrap().failure.clone().unwrap();
    assert_eq!(failure.error.kind(), ErrorKind::WithNoRetry);
    assert_eq!(destination.write_attempts().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn checkpoint_never_advances_past_an_unconfirmed_flush() {
    init_test_tracing();
    let _scenario = ConfiguredFailpoints::setup(&[(FLUSH_BEFORE_CHECKPOINT, "return(no_retry)")]);

    let (mut engine, destination, store) = memory_engine(test_config(json!({}))).await;
    let emitted = accept_all(
        &mut engine,
        [
            schema("animals", animals_schema(), &["id"]),
            record("animals", json!({"id": 1, "name": "cat"})),
            state(json!({"bookmark": 1})),
        ],
    )
    .await
    .unwrap();
    let summary = engine.finish().await.unwrap();

    // The rows committed, but the run cannot vouch for them.
    assert_eq!(destination.table_rows(&animals_table()).await.len(), 1);
    assert!(store.history().await.is_empty());
    assert!(emitted.is_empty());
    assert_eq!(summary.final_state, None);
    assert!(summary.stream("animals").unwrap().is_failed());
}
