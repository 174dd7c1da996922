//! Wire-level task envelope and delivery properties.
//!
//! The envelope is the serialized unit of work placed on a queue. It carries
//! everything a worker needs to execute the task without further lookups. The
//! delivery properties are a projection of the same message fields onto the
//! transport: they must stay consistent with the envelope's own
//! `timeout`/`priority` values.
//!
//! Two deadlines share the `timeout` budget and must not be conflated: the
//! expiration in [`DeliveryProperties`] is the *queueing* deadline, measured
//! from publish and enforced by the transport dropping undelivered envelopes;
//! the *processing* deadline is measured by the worker executor from the
//! start of handler invocation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{ChannelType, Message, Priority, DEFAULT_TIMEOUT_SECS};

/// Positional task arguments. One entry, carrying the message content.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TaskArgs {
    pub content: String,
}

/// The JSON payload published to a queue.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TaskEnvelope {
    pub task: String,
    pub id: Uuid,
    pub args: Vec<TaskArgs>,
    #[serde(default)]
    pub kwargs: serde_json::Map<String, serde_json::Value>,
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_timeout() -> u32 {
    DEFAULT_TIMEOUT_SECS
}

impl TaskEnvelope {
    /// Builds an envelope for a message routed to `channel`, with a fresh id.
    pub fn build(channel: ChannelType, message: &Message) -> Self {
        Self {
            task: channel.task_name(),
            id: Uuid::new_v4(),
            args: vec![TaskArgs {
                content: message.content().to_owned(),
            }],
            kwargs: serde_json::Map::new(),
            timeout: message.timeout(),
            priority: message.priority(),
            metadata: message.metadata().clone(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Message content, if the envelope carries one.
    pub fn content(&self) -> Option<&str> {
        self.args.first().map(|a| a.content.as_str())
    }
}

/// Transport-level properties attached at publish time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryProperties {
    /// Must survive a broker restart.
    pub persistent: bool,
    pub content_type: &'static str,
    pub content_encoding: &'static str,
    /// Queueing deadline in milliseconds, measured from publish.
    pub expiration_ms: u64,
    /// Numeric ordering weight, higher first.
    pub priority: u8,
}

impl DeliveryProperties {
    pub fn for_message(message: &Message) -> Self {
        Self {
            persistent: true,
            content_type: "application/json",
            content_encoding: "utf-8",
            expiration_ms: u64::from(message.timeout()) * 1000,
            priority: message.priority().weight(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(priority: Priority) -> Message {
        Message::new("hello world", 45, priority, HashMap::new()).unwrap()
    }

    #[test]
    fn envelope_carries_the_message_fields() {
        let msg = message(Priority::High);
        let envelope = TaskEnvelope::build(ChannelType::Email, &msg);

        assert_eq!(envelope.task, "process_email_message");
        assert_eq!(envelope.content(), Some("hello world"));
        assert_eq!(envelope.timeout, 45);
        assert_eq!(envelope.priority, Priority::High);
        assert!(envelope.kwargs.is_empty());
    }

    #[test]
    fn wire_shape_matches_the_task_contract() {
        let msg = message(Priority::Low);
        let envelope = TaskEnvelope::build(ChannelType::Sms, &msg);
        let value: serde_json::Value =
            serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();

        assert_eq!(value["task"], "process_sms_message");
        assert_eq!(value["args"][0]["content"], "hello world");
        assert_eq!(value["kwargs"], serde_json::json!({}));
        assert_eq!(value["timeout"], 45);
        assert_eq!(value["priority"], "low");
        assert!(value["id"].as_str().is_some());
    }

    #[test]
    fn absent_wire_fields_fall_back_to_defaults() {
        let raw = serde_json::json!({
            "task": "process_sms_message",
            "id": Uuid::new_v4(),
            "args": [{"content": "ping"}],
        });
        let envelope = TaskEnvelope::from_bytes(raw.to_string().as_bytes()).unwrap();

        assert_eq!(envelope.timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(envelope.priority, Priority::Medium);
        assert!(envelope.metadata.is_empty());
    }

    #[test]
    fn properties_project_the_message() {
        let msg = message(Priority::High);
        let props = DeliveryProperties::for_message(&msg);

        assert!(props.persistent);
        assert_eq!(props.content_type, "application/json");
        assert_eq!(props.expiration_ms, 45_000);
        assert_eq!(props.priority, 3);
    }
}
