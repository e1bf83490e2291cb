//! Slack delivery channel.
//!
//! Protocol:
//! 1. `rtm.connect` on the Web API resolves the realtime wss:// URL.
//! 2. The websocket session yields lifecycle frames (`hello`, `message`,
//!    `presence_change`, `pong`) until the link drops, then reconnects
//!    with exponential delay.
//! 3. Outbound notifications go through `chat.postMessage`, identity
//!    lookups through `auth.test` + `users.info`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{Result, SinkError};
use crate::notification::Notification;
use crate::session::{ChatPlatform, Identity, IdentityProvider, SessionEvent};

const DEFAULT_API_HOST: &str = "https://slack.com";

/// Heartbeat cadence on the realtime socket.
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

const BASE_RECONNECT_DELAY_MS: u64 = 1000;
const MAX_RECONNECT_DELAY_MS: u64 = 60_000;

/// Capacity of the session signal channel.
const SESSION_CHANNEL_CAPACITY: usize = 100;

/// Slack connection options, assembled by the process entry point.
#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub token: String,
    pub api_host: String,
}

impl SlackConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_host: DEFAULT_API_HOST.to_string(),
        }
    }

    pub fn with_api_host(mut self, host: impl Into<String>) -> Self {
        self.api_host = host.into();
        self
    }
}

/// Slack Web API + realtime session client.
#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    config: SlackConfig,
}

impl SlackClient {
    pub fn new(config: SlackConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    async fn api_get<T: DeserializeOwned>(&self, method: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/api/{}", self.config.api_host, method);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.token)
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    async fn api_post<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}/api/{}", self.config.api_host, method);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    /// Resolve the realtime session URL.
    async fn realtime_url(&self) -> Result<String> {
        let response: RtmConnectResponse = self.api_get("rtm.connect", &[]).await?;
        if !response.ok {
            return Err(api_error("rtm.connect", response.error));
        }
        response
            .url
            .ok_or_else(|| SinkError::protocol("rtm.connect response missing url"))
    }
}

#[async_trait]
impl ChatPlatform for SlackClient {
    async fn open(&self, shutdown: CancellationToken) -> Result<mpsc::Receiver<SessionEvent>> {
        let (events_tx, events_rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let client = self.clone();

        tokio::spawn(async move {
            let mut delay = BASE_RECONNECT_DELAY_MS;
            loop {
                if shutdown.is_cancelled() {
                    break;
                }

                match client.realtime_url().await {
                    Ok(url) => {
                        debug!("connecting to realtime session");
                        match connect_async(url.as_str()).await {
                            Ok((stream, _)) => {
                                delay = BASE_RECONNECT_DELAY_MS;
                                match run_session(stream, &events_tx, &shutdown).await {
                                    SessionEnd::Shutdown => break,
                                    SessionEnd::LinkLost => {}
                                }
                            }
                            Err(err) => warn!("websocket connect failed: {err}"),
                        }
                    }
                    Err(SinkError::Auth) => {
                        let _ = events_tx.send(SessionEvent::AuthInvalid).await;
                        break;
                    }
                    Err(err) => warn!("failed to resolve realtime session url: {err}"),
                }

                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                    _ = shutdown.cancelled() => break,
                }
                delay = (delay * 2).min(MAX_RECONNECT_DELAY_MS);
            }
            debug!("slack session task stopped");
        });

        Ok(events_rx)
    }

    async fn deliver(
        &self,
        channel: &str,
        identity: &Identity,
        notification: &Notification,
    ) -> Result<()> {
        let payload = build_payload(channel, identity, notification);
        let response: ApiEnvelope = self.api_post("chat.postMessage", &payload).await?;
        if !response.ok {
            return Err(api_error("chat.postMessage", response.error));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for SlackClient {
    async fn current(&self) -> Result<Identity> {
        let auth: AuthTestResponse = self.api_get("auth.test", &[]).await?;
        if !auth.ok {
            return Err(api_error("auth.test", auth.error));
        }
        let user_id = auth
            .user_id
            .ok_or_else(|| SinkError::protocol("auth.test response missing user_id"))?;

        let info: UserInfoResponse = self
            .api_get("users.info", &[("user", user_id.as_str())])
            .await?;
        if !info.ok {
            return Err(api_error("users.info", info.error));
        }
        let user = info
            .user
            .ok_or_else(|| SinkError::protocol("users.info response missing user"))?;

        let profile = user.profile.unwrap_or_default();
        let name = user
            .real_name
            .filter(|s| !s.is_empty())
            .or(user.name)
            .unwrap_or_else(|| user_id.clone());
        Ok(Identity {
            name,
            avatar_url: profile.image_original.or(profile.image_512),
        })
    }
}

enum SessionEnd {
    Shutdown,
    LinkLost,
}

/// Drive one live websocket session until the link breaks or shutdown is
/// requested. Emits `Ready` on the platform's hello acknowledgment and
/// `Gone` when the link is lost.
async fn run_session(
    mut stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    events: &mpsc::Sender<SessionEvent>,
    shutdown: &CancellationToken,
) -> SessionEnd {
    let period = Duration::from_secs(HEARTBEAT_INTERVAL_SECS);
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut ping_id: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = stream.close(None).await;
                return SessionEnd::Shutdown;
            }

            _ = heartbeat.tick() => {
                ping_id += 1;
                let ping = serde_json::json!({
                    "id": ping_id,
                    "type": "ping",
                    "time": Utc::now().timestamp_millis(),
                });
                if let Err(err) = stream.send(Message::Text(ping.to_string().into())).await {
                    warn!("heartbeat failed: {err}");
                    let _ = events.send(SessionEvent::Gone).await;
                    return SessionEnd::LinkLost;
                }
                trace!("sent heartbeat {ping_id}");
            }

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = decode_frame(text.as_str(), Utc::now().timestamp_millis()) {
                        if events.send(event).await.is_err() {
                            return SessionEnd::Shutdown;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    info!("realtime session closed by the platform");
                    let _ = events.send(SessionEvent::Gone).await;
                    return SessionEnd::LinkLost;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!("websocket error: {err}");
                    let _ = events.send(SessionEvent::Gone).await;
                    return SessionEnd::LinkLost;
                }
                None => {
                    warn!("websocket stream ended");
                    let _ = events.send(SessionEvent::Gone).await;
                    return SessionEnd::LinkLost;
                }
            }
        }
    }
}

/// Raw realtime frame. Only the fields the session cares about.
#[derive(Debug, Default, Deserialize)]
struct RtmFrame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    presence: Option<String>,
    #[serde(default)]
    time: Option<i64>,
}

/// Map one realtime frame to a session signal. Frames the sink does not
/// care about (typing indicators, acks, subtyped messages) map to `None`.
fn decode_frame(text: &str, now_ms: i64) -> Option<SessionEvent> {
    let frame: RtmFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            trace!("unparseable realtime frame: {err}");
            return None;
        }
    };

    match frame.kind.as_deref() {
        Some("hello") => Some(SessionEvent::Ready),
        Some("message") if frame.subtype.is_none() => frame.text.map(SessionEvent::Message),
        Some("presence_change") => {
            let user = frame.user.unwrap_or_else(|| "someone".to_string());
            let presence = frame.presence.unwrap_or_else(|| "unknown".to_string());
            Some(SessionEvent::Presence(format!("{user} is {presence}")))
        }
        Some("pong") => frame
            .time
            .map(|sent| SessionEvent::Latency(Duration::from_millis((now_ms - sent).max(0) as u64))),
        _ => None,
    }
}

/// Build the `chat.postMessage` body. Field order in the attachment is the
/// construction order of the notification.
fn build_payload(
    channel: &str,
    identity: &Identity,
    notification: &Notification,
) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "channel": channel,
        "username": identity.name,
    });
    if let Some(url) = &identity.avatar_url {
        payload["icon_url"] = serde_json::json!(url);
    }

    match notification {
        Notification::Text(text) => {
            payload["text"] = serde_json::json!(text);
        }
        Notification::Table { severity, fields } => {
            let mut attachment = serde_json::json!({
                "fallback": notification.fallback(),
                "fields": fields
                    .iter()
                    .map(|f| serde_json::json!({
                        "title": f.label,
                        "value": f.value,
                        "short": true,
                    }))
                    .collect::<Vec<_>>(),
            });
            if let Some(severity) = severity {
                attachment["color"] = serde_json::json!(severity.color());
            }
            payload["attachments"] = serde_json::json!([attachment]);
        }
    }
    payload
}

/// Map a Web API failure to the error taxonomy. Credential-class errors
/// are terminal.
fn api_error(method: &str, error: Option<String>) -> SinkError {
    let reason = error.unwrap_or_else(|| "unknown error".to_string());
    match reason.as_str() {
        "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked" => SinkError::Auth,
        _ => SinkError::transport(format!("{method} failed: {reason}")),
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RtmConnectResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<UserInfo>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    profile: Option<UserProfile>,
}

#[derive(Debug, Default, Deserialize)]
struct UserProfile {
    #[serde(default)]
    image_original: Option<String>,
    #[serde(default)]
    image_512: Option<String>,
}

#[cfg(test)]
mod tests {
    use cluster_events::Severity;

    use super::*;
    use crate::notification::Field;

    #[test]
    fn test_decode_hello_and_message_frames() {
        assert_eq!(
            decode_frame(r#"{"type":"hello"}"#, 0),
            Some(SessionEvent::Ready)
        );
        assert_eq!(
            decode_frame(r#"{"type":"message","text":"hi there","user":"U1"}"#, 0),
            Some(SessionEvent::Message("hi there".to_string()))
        );
    }

    #[test]
    fn test_subtyped_and_unknown_frames_are_ignored() {
        let edited = r#"{"type":"message","subtype":"message_changed","text":"x"}"#;
        assert_eq!(decode_frame(edited, 0), None);
        assert_eq!(decode_frame(r#"{"type":"user_typing"}"#, 0), None);
        assert_eq!(decode_frame("not json", 0), None);
    }

    #[test]
    fn test_pong_frame_yields_latency() {
        let event = decode_frame(r#"{"type":"pong","id":3,"time":1000}"#, 1250);
        assert_eq!(
            event,
            Some(SessionEvent::Latency(Duration::from_millis(250)))
        );
    }

    #[test]
    fn test_presence_frame_is_rendered() {
        let event = decode_frame(r#"{"type":"presence_change","user":"U1","presence":"away"}"#, 0);
        assert_eq!(
            event,
            Some(SessionEvent::Presence("U1 is away".to_string()))
        );
    }

    #[test]
    fn test_credential_errors_are_terminal() {
        assert!(matches!(
            api_error("rtm.connect", Some("invalid_auth".to_string())),
            SinkError::Auth
        ));
        assert!(matches!(
            api_error("chat.postMessage", Some("channel_not_found".to_string())),
            SinkError::Transport(_)
        ));
    }

    #[test]
    fn test_payload_preserves_field_order_and_color() {
        let identity = Identity {
            name: "watchbot".to_string(),
            avatar_url: Some("https://example.com/a.png".to_string()),
        };
        let notification = Notification::table(
            Some(Severity::Danger),
            vec![
                Field::new("Namespace", "default"),
                Field::new("Message", "Deleted pod: web-abc12"),
                Field::new("Node", "node-1"),
            ],
        );

        let payload = build_payload("#ops", &identity, &notification);
        assert_eq!(payload["channel"], "#ops");
        assert_eq!(payload["username"], "watchbot");
        assert_eq!(payload["icon_url"], "https://example.com/a.png");

        let attachment = &payload["attachments"][0];
        assert_eq!(attachment["color"], "danger");
        let titles: Vec<&str> = attachment["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["Namespace", "Message", "Node"]);
        assert_eq!(
            attachment["fallback"],
            "Namespace: default, Message: Deleted pod: web-abc12, Node: node-1"
        );
    }

    #[test]
    fn test_plain_text_payload_has_no_attachments() {
        let identity = Identity {
            name: "watchbot".to_string(),
            avatar_url: None,
        };
        let payload = build_payload("#ops", &identity, &Notification::text("hello"));
        assert_eq!(payload["text"], "hello");
        assert!(payload.get("attachments").is_none());
        assert!(payload.get("icon_url").is_none());
    }
}
