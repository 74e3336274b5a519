//! Error types for the DeathLink environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Network send failed (channel closed, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Send attempted before the connection was enabled
    #[error("Connection {0} is not enabled")]
    NotEnabled(String),

    /// The group cannot be reached (simulated isolation)
    #[error("Group unreachable: {0}")]
    Unreachable(String),

    /// Payload serialization/deserialization failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Runtime/context operation failed
    #[error("Context error: {0}")]
    ContextError(String),
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }

    /// Creates an unreachable error.
    pub fn unreachable(who: impl std::fmt::Display) -> Self {
        Self::Unreachable(who.to_string())
    }
}
