//! Error types for hub operations.

use std::time::Duration;

use fanout_core::SessionId;

use crate::config::ConfigError;

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;

/// Error type for hub operations.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The scheduler did not accept a register/unregister request in time.
    #[error("registry busy: request not accepted within {0:?}")]
    RegistryBusy(Duration),

    #[error("broadcast scheduler is not running")]
    SchedulerUnavailable,

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The session's connection went away before registration was processed.
    #[error("session closed before registration: {0}")]
    SessionClosed(SessionId),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to spawn scheduler: {0}")]
    Spawn(String),
}

/// Error raised by a session's underlying connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection closed")]
    Closed,

    #[error("deadline exceeded")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),
}
