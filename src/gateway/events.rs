use serde_json::Value;

use crate::error::{Error, Result};
use crate::protocol::constants::{
    EVENT_DOC_CLOSE, EVENT_DOC_OPEN, EVENT_DOC_SUBSCRIBE, EVENT_DOC_UNSUBSCRIBE,
    EVENT_DOCTYPE_SUBSCRIBE, EVENT_DOCTYPE_UNSUBSCRIBE, EVENT_PING, EVENT_PROGRESS_SUBSCRIBE,
    EVENT_TASK_SUBSCRIBE, EVENT_TASK_UNSUBSCRIBE,
};
use crate::protocol::messages::EventMessage;

/// A validated client-originated event. Unknown event names never reach this
/// type, and malformed payloads for known events surface as typed errors
/// instead of loosely-typed arguments flowing into handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Ping,
    DoctypeSubscribe(DoctypeTarget),
    DoctypeUnsubscribe(DoctypeTarget),
    TaskSubscribe(TaskTarget),
    TaskUnsubscribe(TaskTarget),
    DocSubscribe(DocTarget),
    DocUnsubscribe(DocTarget),
    DocOpen(DocTarget),
    DocClose(DocTarget),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctypeTarget {
    pub doctype: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTarget {
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocTarget {
    pub doctype: String,
    pub docname: String,
}

impl ClientEvent {
    /// Maps a decoded envelope onto a validated event. Returns `Ok(None)`
    /// for event names this gateway does not handle; those are ignored by
    /// the caller rather than treated as protocol errors.
    pub fn from_message(message: &EventMessage) -> Result<Option<Self>> {
        let event = match message.event.as_str() {
            EVENT_PING => Self::Ping,
            EVENT_DOCTYPE_SUBSCRIBE => {
                Self::DoctypeSubscribe(DoctypeTarget::parse(&message.data)?)
            }
            EVENT_DOCTYPE_UNSUBSCRIBE => {
                Self::DoctypeUnsubscribe(DoctypeTarget::parse(&message.data)?)
            }
            EVENT_TASK_SUBSCRIBE | EVENT_PROGRESS_SUBSCRIBE => {
                Self::TaskSubscribe(TaskTarget::parse(&message.data)?)
            }
            EVENT_TASK_UNSUBSCRIBE => Self::TaskUnsubscribe(TaskTarget::parse(&message.data)?),
            EVENT_DOC_SUBSCRIBE => Self::DocSubscribe(DocTarget::parse(&message.data)?),
            EVENT_DOC_UNSUBSCRIBE => Self::DocUnsubscribe(DocTarget::parse(&message.data)?),
            EVENT_DOC_OPEN => Self::DocOpen(DocTarget::parse(&message.data)?),
            EVENT_DOC_CLOSE => Self::DocClose(DocTarget::parse(&message.data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

impl DoctypeTarget {
    // Accepts both `"Invoice"` and `{"doctype": "Invoice"}`.
    fn parse(data: &Value) -> Result<Self> {
        let doctype = match data {
            Value::String(raw) => required(Some(raw.as_str()), "doctype")?,
            Value::Object(_) => required(str_field(data, "doctype"), "doctype")?,
            _ => {
                return Err(Error::InvalidEventPayload(
                    "expected a doctype string".to_string(),
                ));
            }
        };
        Ok(Self { doctype })
    }
}

impl TaskTarget {
    fn parse(data: &Value) -> Result<Self> {
        let task_id = match data {
            Value::String(raw) => required(Some(raw.as_str()), "task_id")?,
            Value::Object(_) => required(str_field(data, "task_id"), "task_id")?,
            _ => {
                return Err(Error::InvalidEventPayload(
                    "expected a task_id string".to_string(),
                ));
            }
        };
        Ok(Self { task_id })
    }
}

impl DocTarget {
    // Accepts `{"doctype": .., "docname": ..}` and the positional
    // `["doctype", "docname"]` form.
    fn parse(data: &Value) -> Result<Self> {
        match data {
            Value::Object(_) => Ok(Self {
                doctype: required(str_field(data, "doctype"), "doctype")?,
                docname: required(str_field(data, "docname"), "docname")?,
            }),
            Value::Array(items) if items.len() == 2 => Ok(Self {
                doctype: required(items[0].as_str(), "doctype")?,
                docname: required(items[1].as_str(), "docname")?,
            }),
            _ => Err(Error::InvalidEventPayload(
                "expected a doctype and docname".to_string(),
            )),
        }
    }
}

fn str_field<'a>(data: &'a Value, field: &str) -> Option<&'a str> {
    data.get(field).and_then(Value::as_str)
}

fn required(value: Option<&str>, field: &str) -> Result<String> {
    match value {
        Some(raw) if !raw.trim().is_empty() => Ok(raw.to_string()),
        _ => Err(Error::InvalidEventPayload(format!(
            "missing or empty {field}"
        ))),
    }
}
