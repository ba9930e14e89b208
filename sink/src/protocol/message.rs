use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::bail;
use crate::error::{ErrorKind, SinkResult};
use crate::sink_error;

/// Declares or redeclares the shape of a stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SchemaMessage {
    pub stream: String,
    /// JSON schema of the records.
    pub schema: Value,
    #[serde(default)]
    pub key_properties: Option<Vec<String>>,
    #[serde(default)]
    pub bookmark_properties: Option<Vec<String>>,
}

/// Carries one record of a stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordMessage {
    pub stream: String,
    pub record: Map<String, Value>,
    #[serde(default)]
    pub version: Option<i64>,
    /// Kept as text so that an unparsable extraction time never rejects the record.
    #[serde(default)]
    pub time_extracted: Option<String>,
}

/// Signals that every record of the given version has been sent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivateVersionMessage {
    pub stream: String,
    pub version: i64,
}

/// Opaque bookmark to hand back once everything before it is committed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StateMessage {
    pub value: Value,
}

/// A message the engine accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Schema(SchemaMessage),
    Record(RecordMessage),
    ActivateVersion(ActivateVersionMessage),
    State(StateMessage),
}

impl Message {
    /// Parses one line of input.
    ///
    /// Returns `Ok(None)` for message types that are recognized but not loaded, such as
    /// `BATCH`. Malformed lines and unknown types fail with [`ErrorKind::InvalidMessage`].
    pub fn parse(line: &str) -> SinkResult<Option<Message>> {
        let value: Value = serde_json::from_str(line).map_err(|err| {
            sink_error!(
                ErrorKind::InvalidMessage,
                "Input line is not valid JSON",
                err.to_string(),
                source: err
            )
        })?;

        let Some(message_type) = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_owned)
        else {
            bail!(
                ErrorKind::InvalidMessage,
                "Message has no `type` property",
                excerpt(line)
            );
        };

        let message = match message_type.as_str() {
            "SCHEMA" => Message::Schema(decode(&message_type, value)?),
            "RECORD" => Message::Record(decode(&message_type, value)?),
            "ACTIVATE_VERSION" => Message::ActivateVersion(decode(&message_type, value)?),
            "STATE" => Message::State(decode(&message_type, value)?),
            "BATCH" => {
                warn!("BATCH messages are not supported, skipping");
                return Ok(None);
            }
            other => bail!(
                ErrorKind::InvalidMessage,
                "Unknown message type",
                format!("`{other}` is not a Singer message type")
            ),
        };

        Ok(Some(message))
    }

    /// Returns the stream the message belongs to, `None` for STATE.
    pub fn stream(&self) -> Option<&str> {
        match self {
            Message::Schema(message) => Some(&message.stream),
            Message::Record(message) => Some(&message.stream),
            Message::ActivateVersion(message) => Some(&message.stream),
            Message::State(_) => None,
        }
    }
}

fn decode<T>(message_type: &str, value: Value) -> SinkResult<T>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(value).map_err(|err| {
        sink_error!(
            ErrorKind::InvalidMessage,
            "Message is missing required properties",
            format!("{message_type}: {err}"),
            source: err
        )
    })
}

fn excerpt(line: &str) -> String {
    line.chars().take(120).collect()
}
