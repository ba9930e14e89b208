use config::shared::TargetConfig;
use mysql::schema::describe_table;
use mysql::test_utils::{create_mysql_database, drop_mysql_database, local_mysql_connection_config};
use serde_json::json;
use sink::checkpoint::mysql::MySqlCheckpointStore;
use sink::destination::mysql::MySqlDestination;
use sink::engine::Engine;
use sink::protocol::Message;
use sink::schema::metadata::is_metadata_column;
use sink::test_utils::fixtures::{
    activate_version, animals_schema, record, schema, test_config, versioned_record,
};
use sink::types::TableName;
use sqlx::{Executor, MySqlPool};
use telemetry::init_test_tracing;

async fn setup(overrides: serde_json::Value) -> (TargetConfig, MySqlPool) {
    let mut config = test_config(overrides);
    config.connection = local_mysql_connection_config();
    let pool = create_mysql_database(&config.connection).await;

    (config, pool)
}

/// Runs `messages` through an engine with its own pool, which is closed once it finishes.
async fn run(config: &TargetConfig, messages: Vec<Message>) -> sink::engine::RunSummary {
    let destination = MySqlDestination::connect(config).await.unwrap();
    let store = MySqlCheckpointStore::new(
        destination.pool().clone(),
        config.connection.database.clone(),
    );

    let mut engine = Engine::new(config.clone(), destination, store).await.unwrap();
    for message in messages {
        engine.accept(message).await.unwrap();
    }

    engine.finish().await.unwrap()
}

async fn count_rows(pool: &MySqlPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM `{table}`"))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn animals_load_end_to_end() {
    init_test_tracing();
    let (config, pool) = setup(json!({})).await;

    let summary = run(
        &config,
        vec![
            schema(
                "animals",
                json!({"properties": {"id": {"type": "integer"}, "name": {"type": "string"}}}),
                &["id"],
            ),
            record("animals", json!({"id": 1, "name": "cat"})),
            record("animals", json!({"id": 2, "name": "dog"})),
            activate_version("animals", 1),
            record("animals", json!({"id": 1, "name": "cat", "extra": "x"})),
        ],
    )
    .await;
    assert!(summary.is_success());

    let table_name = TableName::new(config.connection.database.clone(), "animals");
    let columns = describe_table(&pool, &table_name).await.unwrap().unwrap();
    let data_columns: Vec<&str> = columns
        .iter()
        .map(|column| column.name.as_str())
        .filter(|name| !is_metadata_column(name))
        .collect();
    assert_eq!(data_columns, vec!["id", "name", "extra"]);

    let rows: Vec<(i64, String, Option<String>)> =
        sqlx::query_as("SELECT id, name, extra FROM animals ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(
        rows,
        vec![
            (1, "cat".to_string(), Some("x".to_string())),
            (2, "dog".to_string(), None)
        ]
    );

    drop_mysql_database(&pool, &config.connection).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn hard_delete_activation_is_idempotent_across_runs() {
    init_test_tracing();
    let (config, pool) = setup(json!({"hard_delete": true})).await;

    let messages = vec![
        schema("animals", animals_schema(), &["id"]),
        versioned_record("animals", json!({"id": 1, "name": "cat"}), 1),
        versioned_record("animals", json!({"id": 2, "name": "dog"}), 1),
        activate_version("animals", 1),
        versioned_record("animals", json!({"id": 1, "name": "cat"}), 2),
        activate_version("animals", 2),
    ];
    run(&config, messages).await;
    assert_eq!(count_rows(&pool, "animals").await, 1);

    run(
        &config,
        vec![
            schema("animals", animals_schema(), &["id"]),
            activate_version("animals", 2),
        ],
    )
    .await;
    assert_eq!(count_rows(&pool, "animals").await, 1);

    let version: i64 =
        sqlx::query_scalar("SELECT version FROM _sdc_table_versions WHERE table_name = 'animals'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(version, 2);

    drop_mysql_database(&pool, &config.connection).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn upsert_is_emulated_without_a_matching_primary_key() {
    init_test_tracing();
    let (config, pool) = setup(json!({})).await;

    pool.execute("CREATE TABLE animals (id BIGINT, name VARCHAR(255))")
        .await
        .unwrap();

    let summary = run(
        &config,
        vec![
            schema("animals", animals_schema(), &["id"]),
            record("animals", json!({"id": 1, "name": "a"})),
            record("animals", json!({"id": 1, "name": "b"})),
            record("animals", json!({"id": 2, "name": "c"})),
        ],
    )
    .await;
    assert!(summary.is_success());

    let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM animals ORDER BY id")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(rows, vec![(1, "b".to_string()), (2, "c".to_string())]);

    drop_mysql_database(&pool, &config.connection).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn resumed_runs_skip_checkpointed_records() {
    init_test_tracing();
    let (config, pool) = setup(json!({"batch": {"max_rows": 1}})).await;

    let first_run = vec![
        schema("animals", animals_schema(), &["id"]),
        record("animals", json!({"id": 1, "name": "cat"})),
        record("animals", json!({"id": 2, "name": "dog"})),
    ];
    run(&config, first_run.clone()).await;

    let mut resumed = config.clone();
    resumed.resume_from_checkpoint = true;
    let mut second_run = first_run;
    second_run.push(record("animals", json!({"id": 3, "name": "cow"})));
    let summary = run(&resumed, second_run).await;

    let stats = summary.stream("animals").unwrap().stats;
    assert_eq!(stats.resumed, 2);
    assert_eq!(stats.written, 1);
    assert_eq!(count_rows(&pool, "animals").await, 3);

    drop_mysql_database(&pool, &config.connection).await;
}
