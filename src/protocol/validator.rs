//! Structural checks for messages.

use thiserror::Error;

use super::envelope::Message;
use super::types::MessageKind;

/// First structural rule a message violates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("id is required")]
    MissingId,

    #[error("sender_id is required")]
    MissingSender,

    #[error("receiver_id is required")]
    MissingReceiver,

    #[error("timestamp is required")]
    MissingTimestamp,

    #[error("payload is required")]
    MissingPayload,

    #[error("payload must be a mapping")]
    PayloadNotMapping,

    #[error("correlation_id is required for response messages")]
    MissingCorrelationId,
}

/// Validates message structure.
pub struct MessageValidator;

impl MessageValidator {
    /// Check a message, reporting only the first violated rule.
    pub fn validate(message: &Message) -> Result<(), ValidationError> {
        if message.id.is_empty() {
            return Err(ValidationError::MissingId);
        }
        if message.sender_id.is_empty() {
            return Err(ValidationError::MissingSender);
        }
        if message.receiver_id.is_empty() {
            return Err(ValidationError::MissingReceiver);
        }
        if message.timestamp.is_empty() {
            return Err(ValidationError::MissingTimestamp);
        }
        if message.payload.is_null() {
            return Err(ValidationError::MissingPayload);
        }
        if !message.payload.is_object() {
            return Err(ValidationError::PayloadNotMapping);
        }

        if message.kind == MessageKind::Response
            && message.correlation_id.as_deref().map_or(true, str::is_empty)
        {
            return Err(ValidationError::MissingCorrelationId);
        }

        Ok(())
    }

    pub fn is_valid(message: &Message) -> bool {
        Self::validate(message).is_ok()
    }
}
