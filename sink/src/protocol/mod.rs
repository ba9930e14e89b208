//! Singer message format: one JSON object per line, tagged by `type`.

pub mod json_schema;
pub mod message;

pub use json_schema::parse_stream_schema;
pub use message::{
    ActivateVersionMessage, Message, RecordMessage, SchemaMessage, StateMessage,
};
