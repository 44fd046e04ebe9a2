//! Error types for agentmesh.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("{0}")]
    Other(String),
}

/// Failures of context store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("Path is empty")]
    EmptyPath,

    #[error("Key '{path}' is not a list")]
    NotASequence { path: String },

    #[error("Cannot descend into '{path}': not a mapping")]
    NotAMapping { path: String },

    #[error("Version {0} not found")]
    VersionNotFound(u64),

    #[error("No previous version to roll back to")]
    NoPreviousVersion,
}

/// Failures of directory and routing operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Agent {0} already registered")]
    AlreadyRegistered(String),

    #[error("Agent {0} not found")]
    NotFound(String),

    #[error("Receiver {receiver_id} not found for message {message_id}")]
    UnknownReceiver {
        receiver_id: String,
        message_id: String,
    },
}
