use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::constants::{EVENT_DOC_VIEWERS, EVENT_PONG};

/// Envelope for every frame exchanged with a client, in both directions.
/// `data` is omitted on the wire when there is no payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventMessage {
    pub event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl EventMessage {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn pong() -> Self {
        Self::new(EVENT_PONG, Value::Null)
    }

    pub fn doc_viewers(doctype: &str, docname: &str, users: Vec<String>) -> Self {
        Self::new(
            EVENT_DOC_VIEWERS,
            json!({
                "doctype": doctype,
                "docname": docname,
                "users": users,
            }),
        )
    }

    /// A backend-originated event forwarded verbatim to clients.
    pub fn relayed(event: String, message: Value) -> Self {
        Self { event, data: message }
    }
}

/// Envelope published by the backend on the pub/sub channel. `room`, when
/// present, is already site-qualified by the publisher; without it the event
/// is broadcast to every connected socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub event: String,
    #[serde(default)]
    pub message: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}
