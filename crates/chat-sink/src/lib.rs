//! Connection-aware notification sink.
//!
//! The [`Sink`] owns a connection to a chat delivery channel. Notifications
//! emitted while the link is down are queued and flushed in order once the
//! platform signals readiness; a failed send while connected is surfaced to
//! the caller and never retried here.
//!
//! The chat platform itself sits behind the [`ChatPlatform`] and
//! [`IdentityProvider`] traits; [`slack::SlackClient`] is the production
//! implementation.

mod error;
mod notification;
mod session;
mod sink;
pub mod slack;

pub use error::{Result, SinkError};
pub use notification::{Field, Notification};
pub use session::{ChatPlatform, Identity, IdentityProvider, SessionEvent};
pub use sink::{Sink, SinkHandle};
