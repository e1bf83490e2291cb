//! Observer error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Unrecoverable observer errors, raised on the error side channel.
///
/// Transient transport errors never surface here; the watch primitive
/// retries those itself.
#[derive(Error, Debug)]
pub enum WatchError {
    /// Credentials rejected by the API server. Not retryable.
    #[error("invalid cluster credentials: {0}")]
    Auth(String),

    /// A watch stream ended without shutdown being requested.
    #[error("{0} watch stream ended unexpectedly")]
    StreamClosed(&'static str),
}
