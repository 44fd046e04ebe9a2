//! Message kinds, priority classes and payload type for agent communication.

use serde::{Deserialize, Serialize};

/// Open-ended message body: string keys to arbitrary JSON values.
///
/// The transport never looks inside it.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Message kind classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Request expecting a response
    Request,
    /// Response to a request (must carry a correlation id)
    Response,
    /// Status update / notification, no response expected
    Notification,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
            MessageKind::Notification => "notification",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message priority levels.
///
/// Dequeue order is driven by [`Priority::rank`], not by the enum layout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Numeric rank; lower ranks are dequeued first.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_rank_table() {
        assert_eq!(Priority::High.rank(), 0);
        assert_eq!(Priority::Medium.rank(), 1);
        assert_eq!(Priority::Low.rank(), 2);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_lowercase_names() {
        assert_eq!(serde_json::to_string(&MessageKind::Notification).unwrap(), "\"notification\"");
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");

        let kind: MessageKind = serde_json::from_str("\"response\"").unwrap();
        assert_eq!(kind, MessageKind::Response);
        assert!(serde_json::from_str::<Priority>("\"HIGH\"").is_err());
    }
}
