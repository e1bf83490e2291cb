//! Chat platform boundary.
//!
//! The sink consumes exactly two collaborator shapes: a realtime session
//! yielding lifecycle signals, and a send primitive. Both live behind
//! traits so tests can stand in for the platform.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::notification::Notification;

/// Lifecycle signals from the platform's realtime session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The platform acknowledged the session; deliveries will go through.
    Ready,
    /// The link was lost; the platform is reconnecting on its own.
    Gone,
    /// A plain-text message a user sent to the channel.
    Message(String),
    /// A presence change, pre-rendered for logging.
    Presence(String),
    /// Round-trip latency as measured by the session heartbeat.
    Latency(Duration),
    /// Credentials were rejected. Terminal; the session will not retry.
    AuthInvalid,
}

/// The bot's display identity at the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub avatar_url: Option<String>,
}

/// Resolves the bot's current display identity.
///
/// Called before every delivery rather than cached, so identity changes
/// mid-session take effect on the next send.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    async fn current(&self) -> Result<Identity>;
}

/// A chat delivery channel.
#[async_trait]
pub trait ChatPlatform: Send + Sync + 'static {
    /// Start the realtime session and return its lifecycle signal stream.
    /// The platform owns socket management and reconnection; the stream
    /// stays open until `shutdown` is cancelled or the session dies for
    /// good.
    async fn open(&self, shutdown: CancellationToken) -> Result<mpsc::Receiver<SessionEvent>>;

    /// Deliver one notification to the target channel under the given
    /// display identity.
    async fn deliver(
        &self,
        channel: &str,
        identity: &Identity,
        notification: &Notification,
    ) -> Result<()>;
}
