use serde_json::json;
use sink::checkpoint::memory::MemoryCheckpointStore;
use sink::destination::memory::MemoryDestination;
use sink::engine::Engine;
use sink::test_utils::fixtures::{
    accept_all, animals_schema, animals_table, memory_engine, record, schema, state, test_config,
};
use telemetry::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn state_is_acknowledged_only_after_preceding_records_commit() {
    init_test_tracing();

    let (mut engine, destination, store) = memory_engine(test_config(json!({}))).await;

    let emitted = accept_all(
        &mut engine,
        [
            schema("animals", animals_schema(), &["id"]),
            record("animals", json!({"id": 1, "name": "cat"})),
            state(json!({"bookmark": 1})),
            record("animals", json!({"id": 2, "name": "dog"})),
            state(json!({"bookmark": 2})),
        ],
    )
    .await
    .unwrap();

    // Both records are still buffered.
    assert!(emitted.is_empty());
    assert!(destination.table_rows(&animals_table()).await.is_empty());

    let summary = engine.finish().await.unwrap();
    assert_eq!(summary.final_state, Some(json!({"bookmark": 2})));
    assert_eq!(destination.table_rows(&animals_table()).await.len(), 2);
    assert_eq!(store.history().await, vec![("animals".to_string(), 4)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn acknowledged_states_follow_input_order() {
    init_test_tracing();

    let config = test_config(json!({"batch": {"max_rows": 1}}));
    let (mut engine, _, _) = memory_engine(config).await;

    let mut messages = vec![schema("animals", animals_schema(), &["id"])];
    for id in 1..=5 {
        messages.push(record("animals", json!({"id": id, "name": "cat"})));
        messages.push(state(json!({"bookmark": id})));
    }

    let mut acknowledged = accept_all(&mut engine, messages).await.unwrap();
    let summary = engine.finish().await.unwrap();
    acknowledged.extend(summary.final_state);

    // Acknowledgements may be coalesced, but never go backwards and always reach the last one.
    let bookmarks: Vec<i64> = acknowledged
        .iter()
        .map(|value| value["bookmark"].as_i64().unwrap())
        .collect();
    assert!(bookmarks.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(bookmarks.last(), Some(&5));
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_acknowledges_nothing_beyond_committed_records() {
    init_test_tracing();

    let (mut engine, destination, _) = memory_engine(test_config(json!({}))).await;

    accept_all(
        &mut engine,
        [
            schema("animals", animals_schema(), &["id"]),
            state(json!({"bookmark": 0})),
            record("animals", json!({"id": 1, "name": "cat"})),
            state(json!({"bookmark": 1})),
        ],
    )
    .await
    .unwrap();

    let summary = engine.shutdown().await.unwrap();
    assert!(summary.interrupted);
    assert!(!summary.is_success());
    assert_eq!(summary.final_state, None);
    assert!(destination.table_rows(&animals_table()).await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn resumed_runs_skip_committed_records() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let store = MemoryCheckpointStore::new();
    let first_run = [
        schema("animals", animals_schema(), &["id"]),
        record("animals", json!({"id": 1, "name": "cat"})),
        record("animals", json!({"id": 2, "name": "dog"})),
    ];

    let mut engine = Engine::new(test_config(json!({})), destination.clone(), store.clone())
        .await
        .unwrap();
    accept_all(&mut engine, first_run.clone()).await.unwrap();
    engine.finish().await.unwrap();

    let config = test_config(json!({"resume_from_checkpoint": true}));
    let mut engine = Engine::new(config, destination.clone(), store.clone())
        .await
        .unwrap();
    let mut second_run = first_run.to_vec();
    second_run.push(record("animals", json!({"id": 3, "name": "cow"})));
    accept_all(&mut engine, second_run).await.unwrap();
    let summary = engine.finish().await.unwrap();

    let stats = summary.stream("animals").unwrap().stats;
    assert_eq!(stats.resumed, 2);
    assert_eq!(stats.received, 1);
    assert_eq!(destination.table_rows(&animals_table()).await.len(), 3);
    assert_eq!(
        store.history().await,
        vec![("animals".to_string(), 3), ("animals".to_string(), 4)]
    );
}
