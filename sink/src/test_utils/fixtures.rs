use config::shared::TargetConfig;
use serde_json::{Map, Value, json};

use crate::checkpoint::memory::MemoryCheckpointStore;
use crate::destination::memory::MemoryDestination;
use crate::engine::{Engine, RunSummary};
use crate::error::SinkResult;
use crate::protocol::{
    ActivateVersionMessage, Message, RecordMessage, SchemaMessage, StateMessage,
};
use crate::types::{Cell, TableName, TableRow};

/// Database the test configuration points at.
pub const TEST_DATABASE: &str = "melty";

pub type MemoryEngine = Engine<MemoryDestination, MemoryCheckpointStore>;

/// Configuration for tests: no record metadata, fast retries and large batches.
///
/// `overrides` is merged into the configuration JSON before deserializing, so tests set
/// exactly the options they exercise.
pub fn test_config(overrides: Value) -> TargetConfig {
    let mut config = json!({
        "host": "localhost",
        "user": "root",
        "database": TEST_DATABASE,
        "add_record_metadata": false,
        "batch": { "max_rows": 1000 },
        "retry": {
            "max_attempts": 3,
            "initial_retry_delay_ms": 1,
            "max_retry_delay_ms": 5
        }
    });

    if let (Some(config), Value::Object(overrides)) = (config.as_object_mut(), overrides) {
        for (key, value) in overrides {
            config.insert(key, value);
        }
    }

    serde_json::from_value(config).unwrap()
}

/// Creates an engine over fresh in-memory stores and returns handles to inspect them.
pub async fn memory_engine(
    config: TargetConfig,
) -> (MemoryEngine, MemoryDestination, MemoryCheckpointStore) {
    let destination = MemoryDestination::new();
    let store = MemoryCheckpointStore::new();
    let engine = Engine::new(config, destination.clone(), store.clone())
        .await
        .unwrap();

    (engine, destination, store)
}

/// Feeds `messages` in order and returns every STATE value the engine emitted.
pub async fn accept_all(
    engine: &mut MemoryEngine,
    messages: impl IntoIterator<Item = Message>,
) -> SinkResult<Vec<Value>> {
    let mut emitted = Vec::new();
    for message in messages {
        if let Some(state) = engine.accept(message).await? {
            emitted.push(state);
        }
    }

    Ok(emitted)
}

/// Runs `messages` through a new engine to completion.
pub async fn run_to_completion(
    config: TargetConfig,
    messages: impl IntoIterator<Item = Message>,
) -> (RunSummary, MemoryDestination, Vec<Value>) {
    let (mut engine, destination, _) = memory_engine(config).await;
    let emitted = accept_all(&mut engine, messages).await.unwrap();
    let summary = engine.finish().await.unwrap();

    (summary, destination, emitted)
}

pub fn schema(stream: &str, schema: Value, keys: &[&str]) -> Message {
    Message::Schema(SchemaMessage {
        stream: stream.to_string(),
        schema,
        key_properties: Some(keys.iter().map(|key| key.to_string()).collect()),
        bookmark_properties: None,
    })
}

pub fn record(stream: &str, data: Value) -> Message {
    Message::Record(RecordMessage {
        stream: stream.to_string(),
        record: object(data),
        version: None,
        time_extracted: None,
    })
}

pub fn versioned_record(stream: &str, data: Value, version: i64) -> Message {
    Message::Record(RecordMessage {
        stream: stream.to_string(),
        record: object(data),
        version: Some(version),
        time_extracted: None,
    })
}

pub fn activate_version(stream: &str, version: i64) -> Message {
    Message::ActivateVersion(ActivateVersionMessage {
        stream: stream.to_string(),
        version,
    })
}

pub fn state(value: Value) -> Message {
    Message::State(StateMessage { value })
}

/// Schema of the `animals` stream: an integer key and two nullable strings.
pub fn animals_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": "integer" },
            "name": { "type": ["null", "string"] },
            "color": { "type": ["null", "string"] }
        }
    })
}

/// `animals_schema` with an additional nullable `extra` string.
pub fn animals_schema_with_extra() -> Value {
    let mut schema = animals_schema();
    schema["properties"]["extra"] = json!({ "type": ["null", "string"] });
    schema
}

/// Table the `animals` stream lands in.
pub fn animals_table() -> TableName {
    TableName::new(TEST_DATABASE, "animals")
}

/// Returns the row whose `column` holds the integer `value`.
pub fn find_row<'a>(rows: &'a [TableRow], column: &str, value: i64) -> Option<&'a TableRow> {
    rows.iter()
        .find(|row| row.get(column) == Some(&Cell::I64(value)))
}

/// Returns the string cell of `column`, `None` for NULL.
pub fn string_cell(row: &TableRow, column: &str) -> Option<String> {
    match row.get(column) {
        Some(Cell::String(value)) => Some(value.clone()),
        Some(Cell::Null) | None => None,
        Some(other) => panic!("column `{column}` holds a non string cell: {other:?}"),
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("record data must be an object, got {other}"),
    }
}
