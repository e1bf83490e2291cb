//! Sink error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, SinkError>;

/// Errors that can occur while talking to the delivery channel.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The realtime link or the platform API is unavailable.
    #[error("transport error: {0}")]
    Transport(String),

    /// The platform rejected a delivery attempt.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Unexpected payload shape from the platform.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Credentials rejected by the platform. Not retryable.
    #[error("invalid chat credentials")]
    Auth,

    /// HTTP-level errors from the platform API.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SinkError {
    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a delivery error.
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}
