//! Error types for the V2X environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Publish failed (connection closed, forwarder gone, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// No transport is available (broker unreachable, offline mode)
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    /// A bounded queue rejected the item
    #[error("Queue full (capacity {0})")]
    QueueFull(usize),
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }

    /// Creates an unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}
