//! Message envelopes with correlation IDs for request/response tracking.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{MessageKind, Payload, Priority};

/// One unit of communication between two agents.
///
/// The structural form is exactly `id, sender_id, receiver_id, timestamp,
/// kind, payload, priority, correlation_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID (ULID)
    pub id: String,
    /// Sender agent ID
    pub sender_id: String,
    /// Recipient agent ID
    pub receiver_id: String,
    /// Creation time (RFC 3339, UTC). Informational only.
    pub timestamp: String,
    pub kind: MessageKind,
    /// Message body. `Null` only when a decoded record had no payload.
    #[serde(default)]
    pub payload: Value,
    pub priority: Priority,
    /// ID of the request this message answers
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl Message {
    /// Create a message with medium priority and no correlation id.
    pub fn new(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        kind: MessageKind,
        payload: Payload,
    ) -> Self {
        Self {
            id: generate_id(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            timestamp: current_timestamp(),
            kind,
            payload: Value::Object(payload),
            priority: Priority::default(),
            correlation_id: None,
        }
    }

    /// Create a message with every field spelled out.
    ///
    /// No validation happens here; see [`super::MessageValidator`].
    pub fn create(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        kind: MessageKind,
        payload: Payload,
        priority: Priority,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            priority,
            correlation_id,
            ..Self::new(sender_id, receiver_id, kind, payload)
        }
    }

    pub fn request(sender_id: impl Into<String>, receiver_id: impl Into<String>, payload: Payload) -> Self {
        Self::new(sender_id, receiver_id, MessageKind::Request, payload)
    }

    pub fn notification(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self::new(sender_id, receiver_id, MessageKind::Notification, payload)
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set correlation ID for request/response tracking.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Create the response to this message.
    ///
    /// The response goes back to the original sender, keeps the original
    /// priority and correlates to the original id.
    pub fn create_response(&self, sender_id: impl Into<String>, payload: Payload) -> Self {
        Self::create(
            sender_id,
            self.sender_id.clone(),
            MessageKind::Response,
            payload,
            self.priority,
            Some(self.id.clone()),
        )
    }

    /// Payload as a mapping, if it is one.
    pub fn payload_map(&self) -> Option<&Payload> {
        self.payload.as_object()
    }

    /// Look up one payload field.
    pub fn payload_field(&self, key: &str) -> Option<&Value> {
        self.payload_map().and_then(|p| p.get(key))
    }

    /// Flat structural form.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} -> {} [{}]",
            self.kind, self.id, self.sender_id, self.receiver_id, self.priority
        )
    }
}

fn generate_id() -> String {
    ulid::Ulid::new().to_string()
}

pub(crate) fn current_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
