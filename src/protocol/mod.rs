//! Agent communication protocol.
//!
//! This module defines the structured protocol agents speak:
//! - Message envelopes with correlation IDs
//! - Typed message kinds and priority classes
//! - Structural validation
//! - Bounded per-agent mailboxes

pub mod envelope;
pub mod mailbox;
pub mod types;
pub mod validator;

pub use envelope::Message;
pub use mailbox::{Delivery, Mailbox, MailboxStats};
pub use types::{MessageKind, Payload, Priority};
pub use validator::{MessageValidator, ValidationError};
