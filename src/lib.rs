//! agentmesh library root.
//!
//! Agents exchange typed messages through a [`Registry`], each draining a
//! bounded priority mailbox on its own worker task, and share state
//! through a versioned [`ContextStore`].

pub mod agent;
pub mod cli;
pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod protocol;

pub use agent::{Agent, AgentBehavior, AgentConfig, AgentInfo, AgentState, AgentStats, ProcessError};
pub use config::{load_settings, Settings};
pub use context::{ContextConfig, ContextStore, VersionInfo};
pub use core::{Registry, RegistryStats};
pub use error::{ContextError, Error, RegistryError, Result};
pub use protocol::{Message, MessageKind, MessageValidator, Payload, Priority, ValidationError};
