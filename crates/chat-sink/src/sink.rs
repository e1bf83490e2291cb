//! Sink connection state machine.
//!
//! State transitions are driven exclusively by platform lifecycle signals,
//! never by emit outcomes. While disconnected, notifications queue; on the
//! transition to connected the queue is flushed once, in order, after a
//! synthesized availability notice.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SinkError};
use crate::notification::Notification;
use crate::session::{ChatPlatform, IdentityProvider, SessionEvent};

/// Synthesized notice sent right after the platform signals readiness.
const ONLINE_NOTICE: &str = "Back online, catching up on cluster notifications.";

/// Synthesized best-effort notice on link loss.
const OFFLINE_NOTICE: &str = "Connection lost, going quiet until the link is back.";

/// Capacity of the inbound message channel.
const INBOUND_CHANNEL_CAPACITY: usize = 100;

struct SinkState {
    connected: bool,
    pending: VecDeque<Notification>,
}

/// Result of connecting a sink.
pub struct SinkHandle {
    /// Plain-text messages users sent to the channel. One live stream per
    /// sink for its lifetime.
    pub inbound: mpsc::Receiver<String>,
    /// The session pump. Finishes with an error only on a terminal
    /// failure (credential rejection or the session dying for good).
    pub task: JoinHandle<Result<()>>,
}

/// Connection-aware notification sink.
///
/// Created once at process start and shared for the process lifetime.
/// `connected` and the pending queue are guarded by one async mutex so
/// emits and session transitions are serialized; in particular no emit can
/// interleave with a drain in progress.
pub struct Sink<P, I> {
    platform: Arc<P>,
    identity: Arc<I>,
    channel: String,
    state: Mutex<SinkState>,
}

impl<P: ChatPlatform, I: IdentityProvider> Sink<P, I> {
    pub fn new(platform: Arc<P>, identity: Arc<I>, channel: impl Into<String>) -> Self {
        Self {
            platform,
            identity,
            channel: channel.into(),
            state: Mutex::new(SinkState {
                connected: false,
                pending: VecDeque::new(),
            }),
        }
    }

    /// Send a notification, or queue it while the link is down.
    ///
    /// Queueing always succeeds and returns immediately. A transport
    /// failure while connected is returned to the caller; the
    /// notification is NOT re-queued here.
    pub async fn emit(&self, notification: Notification) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.connected {
            debug!("delivery channel not ready, queueing notification");
            state.pending.push_back(notification);
            return Ok(());
        }
        self.deliver(&notification).await
    }

    /// Open the realtime session and start pumping its lifecycle signals.
    pub async fn connect(self: &Arc<Self>, shutdown: CancellationToken) -> Result<SinkHandle> {
        let mut session = self.platform.open(shutdown.clone()).await?;
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let sink = Arc::clone(self);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),

                    event = session.recv() => match event {
                        Some(event) => sink.handle_session_event(event, &inbound_tx).await?,
                        None => {
                            return Err(SinkError::transport("session signal stream closed"));
                        }
                    }
                }
            }
        });

        Ok(SinkHandle {
            inbound: inbound_rx,
            task,
        })
    }

    async fn handle_session_event(
        &self,
        event: SessionEvent,
        inbound: &mpsc::Sender<String>,
    ) -> Result<()> {
        match event {
            SessionEvent::Ready => self.on_connected().await,
            SessionEvent::Gone => self.on_disconnected().await,
            SessionEvent::Message(text) => {
                if inbound.send(text).await.is_err() {
                    debug!("inbound consumer gone, dropping message");
                }
            }
            SessionEvent::Presence(change) => debug!("presence change: {change}"),
            SessionEvent::Latency(rtt) => debug!("current latency: {rtt:?}"),
            SessionEvent::AuthInvalid => return Err(SinkError::Auth),
        }
        Ok(())
    }

    /// Ready transition: announce availability, then drain the queue in
    /// FIFO order through the normal delivery path. Individual failures
    /// are logged and the drain keeps going.
    async fn on_connected(&self) {
        let mut state = self.state.lock().await;
        state.connected = true;
        info!("delivery channel ready");

        if let Err(err) = self.deliver(&Notification::text(ONLINE_NOTICE)).await {
            warn!("availability notice failed: {err}");
        }

        let pending: Vec<Notification> = state.pending.drain(..).collect();
        if !pending.is_empty() {
            info!("flushing {} queued notification(s)", pending.len());
        }
        for notification in &pending {
            if let Err(err) = self.deliver(notification).await {
                warn!("queued notification lost in flush: {err}");
            }
        }
    }

    /// Link-lost transition: mark disconnected, then try to get one last
    /// notice out. Failure is expected and ignored.
    async fn on_disconnected(&self) {
        let mut state = self.state.lock().await;
        state.connected = false;
        warn!("delivery channel lost, queueing until it returns");

        if let Err(err) = self.deliver(&Notification::text(OFFLINE_NOTICE)).await {
            debug!("offline notice not delivered: {err}");
        }
    }

    /// Resolve the current display identity, then hand the notification to
    /// the platform.
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let identity = self.identity.current().await?;
        self.platform
            .deliver(&self.channel, &identity, notification)
            .await
    }

    /// Whether the platform has acknowledged the session.
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    /// Number of notifications waiting for the link to return.
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}
