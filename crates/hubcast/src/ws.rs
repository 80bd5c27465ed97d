//! Push channel client: per-connection session protocol plus the reconnect
//! controller that owns it.
//!
//! Liveness is client-driven: the session sends a text `"ping"` on a fixed
//! interval and tears itself down if no `"pong"` arrives within a bounded
//! window. Mobile radios drop idle sockets without a close event, so waiting
//! for the server to notice is not an option. Recovery of anything missed
//! while disconnected happens through the catch-up fetch, merged by id.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use crate::cache::MessageCache;
use crate::client::{ClientOptions, HubClient};
use crate::error::{HubError, Result};
use crate::types::{Message, PushFrame};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7910";

/// Client → server liveness probe interval.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
/// How long a probe may go unanswered before the session is torn down.
pub const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(5);
/// Fixed reconnect delay. Not exponential: the dominant failure mode is a
/// short radio or tab suspension, not server overload.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Close code the server uses to reject a bad or expired token.
pub const CLOSE_CODE_AUTH_FAILED: u16 = 4001;
/// Close code the server uses to reject access to the workspace.
pub const CLOSE_CODE_ACCESS_DENIED: u16 = 4003;

/// Push session lifecycle. `Closed` is terminal for one session; the
/// controller may then start a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Why a session reached `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Intentional local close (controller teardown). Never reconnects.
    LocalClose,
    /// The server refused the credential. Re-authentication is the caller's
    /// job; the controller does not retry.
    AuthRejected,
    /// A liveness probe went unanswered past the bounded window.
    HeartbeatTimeout,
    /// The server closed the socket with the given code.
    ServerClose(u16),
    /// Transport-level failure (socket drop, timeout, DNS hiccup).
    Transport(String),
}

impl CloseReason {
    /// Whether the controller should schedule a reconnect.
    pub fn should_reconnect(&self) -> bool {
        match self {
            Self::LocalClose | Self::AuthRejected => false,
            Self::ServerClose(code) => *code != u16::from(CloseCode::Normal),
            Self::HeartbeatTimeout | Self::Transport(_) => true,
        }
    }
}

/// Classify a server close frame into a reason.
fn classify_close(frame: Option<&CloseFrame<'_>>) -> CloseReason {
    match frame {
        Some(frame) => {
            let code = u16::from(frame.code);
            if code == CLOSE_CODE_AUTH_FAILED || code == CLOSE_CODE_ACCESS_DENIED {
                CloseReason::AuthRejected
            } else {
                CloseReason::ServerClose(code)
            }
        }
        None => CloseReason::Transport("connection closed without a close frame".to_string()),
    }
}

/// Lifecycle events emitted by the push client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Open,
    Close(CloseReason),
    Reconnecting,
    CatchUpMerged { count: usize },
    Error(String),
}

/// A handle for receiving deduplicated messages.
pub type MessageReceiver = broadcast::Receiver<Message>;
/// A handle for receiving lifecycle events.
pub type LifecycleReceiver = broadcast::Receiver<LifecycleEvent>;

enum Command {
    /// Short-circuit a pending reconnect delay (e.g. tab regained focus).
    Nudge,
    /// Intentional teardown.
    Disconnect,
}

/// Options for the push client.
#[derive(Debug, Clone)]
pub struct PushClientOptions {
    pub token: String,
    pub workspace_id: String,
    pub base_url: Option<String>,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl PushClientOptions {
    pub fn new(token: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            workspace_id: workspace_id.into(),
            base_url: None,
            ping_interval: DEFAULT_PING_INTERVAL,
            pong_timeout: DEFAULT_PONG_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout = timeout;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Reconnect controller. Owns zero or one live push session, reconnects on a
/// fixed delay after any non-intentional close, and reconciles gaps through
/// the catch-up fetch after every (re)open.
pub struct PushClient {
    options: PushClientOptions,
    http: HubClient,
    ws_base_url: String,
    message_tx: broadcast::Sender<Message>,
    lifecycle_tx: broadcast::Sender<LifecycleEvent>,
    command_tx: Option<mpsc::Sender<Command>>,
    cache: Arc<Mutex<MessageCache>>,
    state: Arc<Mutex<SessionState>>,
}

impl PushClient {
    /// Create a new push client with the given options.
    pub fn new(options: PushClientOptions) -> Result<Self> {
        let http_base = options
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let http = HubClient::new(
            ClientOptions::new(options.token.clone()).with_base_url(http_base.clone()),
        )?;

        let ws_base_url = http_base
            .replace("https://", "wss://")
            .replace("http://", "ws://")
            .trim_end_matches('/')
            .to_string();

        let (message_tx, _) = broadcast::channel(1024);
        let (lifecycle_tx, _) = broadcast::channel(128);

        Ok(Self {
            options,
            http,
            ws_base_url,
            message_tx,
            lifecycle_tx,
            command_tx: None,
            cache: Arc::new(Mutex::new(MessageCache::new())),
            state: Arc::new(Mutex::new(SessionState::Closed)),
        })
    }

    /// Current session state.
    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    /// Check if a push session is currently open.
    pub async fn is_connected(&self) -> bool {
        *self.state.lock().await == SessionState::Open
    }

    /// Subscribe to deduplicated messages (push and catch-up merged by id).
    pub fn subscribe_messages(&self) -> MessageReceiver {
        self.message_tx.subscribe()
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe_lifecycle(&self) -> LifecycleReceiver {
        self.lifecycle_tx.subscribe()
    }

    /// All messages observed so far, ascending by id.
    pub async fn messages(&self) -> Vec<Message> {
        self.cache.lock().await.messages()
    }

    /// The highest message id observed so far.
    pub async fn last_known_id(&self) -> i64 {
        self.cache.lock().await.last_known_id()
    }

    fn ws_url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}/v1/workspaces/{}/ws",
            self.ws_base_url,
            urlencoding::encode(&self.options.workspace_id)
        ))?;
        url.query_pairs_mut()
            .append_pair("token", &self.options.token);
        Ok(url)
    }

    /// Start the controller. Spawns a background task that keeps exactly one
    /// session alive until `disconnect()` or an auth rejection.
    pub async fn connect(&mut self) -> Result<()> {
        if self.command_tx.is_some() {
            return Ok(());
        }

        let url = self.ws_url()?;
        let (command_tx, mut command_rx) = mpsc::channel::<Command>(32);
        self.command_tx = Some(command_tx);

        let http = self.http.clone();
        let workspace_id = self.options.workspace_id.clone();
        let ping_interval = self.options.ping_interval;
        let pong_timeout = self.options.pong_timeout;
        let reconnect_delay = self.options.reconnect_delay;
        let message_tx = self.message_tx.clone();
        let lifecycle_tx = self.lifecycle_tx.clone();
        let cache = self.cache.clone();
        let state = self.state.clone();

        tokio::spawn(async move {
            'outer: loop {
                *state.lock().await = SessionState::Connecting;
                let stream = match connect_async(url.as_str()).await {
                    Ok((stream, _)) => stream,
                    Err(err) => {
                        *state.lock().await = SessionState::Closed;
                        let _ = lifecycle_tx
                            .send(LifecycleEvent::Close(CloseReason::Transport(err.to_string())));
                        if wait_reconnect(reconnect_delay, &mut command_rx, &lifecycle_tx).await {
                            continue;
                        }
                        break 'outer;
                    }
                };

                *state.lock().await = SessionState::Open;
                let _ = lifecycle_tx.send(LifecycleEvent::Open);

                // Reconcile anything missed while disconnected before (and
                // alongside) the live stream; the cache drops overlap.
                let cursor = cache.lock().await.last_known_id();
                match http.list_since(&workspace_id, cursor, None).await {
                    Ok(batch) => {
                        let fresh = cache.lock().await.merge(batch.messages);
                        let _ = lifecycle_tx
                            .send(LifecycleEvent::CatchUpMerged { count: fresh.len() });
                        for message in fresh {
                            let _ = message_tx.send(message);
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "catch-up fetch failed; relying on live push");
                        let _ = lifecycle_tx.send(LifecycleEvent::Error(err.to_string()));
                    }
                }

                let reason = run_session(
                    stream,
                    ping_interval,
                    pong_timeout,
                    &mut command_rx,
                    &message_tx,
                    &cache,
                    &state,
                )
                .await;

                *state.lock().await = SessionState::Closed;
                let _ = lifecycle_tx.send(LifecycleEvent::Close(reason.clone()));

                if !reason.should_reconnect() {
                    break 'outer;
                }
                if !wait_reconnect(reconnect_delay, &mut command_rx, &lifecycle_tx).await {
                    break 'outer;
                }
            }

            *state.lock().await = SessionState::Closed;
        });

        Ok(())
    }

    /// Short-circuit a pending reconnect delay, e.g. on regaining foreground
    /// visibility. No-op while a session is open.
    pub async fn nudge(&self) -> Result<()> {
        match self.command_tx {
            Some(ref tx) => {
                tx.send(Command::Nudge)
                    .await
                    .map_err(|_| HubError::NotConnected)?;
                Ok(())
            }
            None => Err(HubError::NotConnected),
        }
    }

    /// Intentionally close the push channel. Does not reconnect.
    pub async fn disconnect(&mut self) {
        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(Command::Disconnect).await;
        }
    }
}

/// Sleep through the fixed reconnect delay, emitting `Reconnecting`. Returns
/// false if a disconnect command arrived while waiting.
async fn wait_reconnect(
    delay: Duration,
    command_rx: &mut mpsc::Receiver<Command>,
    lifecycle_tx: &broadcast::Sender<LifecycleEvent>,
) -> bool {
    let _ = lifecycle_tx.send(LifecycleEvent::Reconnecting);
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = command_rx.recv() => {
                match cmd {
                    Some(Command::Nudge) => return true,
                    Some(Command::Disconnect) | None => return false,
                }
            }
        }
    }
}

/// Drive one open socket until it closes, returning why. Covers the OPEN →
/// CLOSING → CLOSED leg of the session state machine; CONNECTING is the dial
/// in the controller loop.
async fn run_session(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ping_interval: Duration,
    pong_timeout: Duration,
    command_rx: &mut mpsc::Receiver<Command>,
    message_tx: &broadcast::Sender<Message>,
    cache: &Arc<Mutex<MessageCache>>,
    state: &Arc<Mutex<SessionState>>,
) -> CloseReason {
    let (mut write, mut read) = stream.split();

    let mut probe = tokio::time::interval(ping_interval);
    probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
    probe.tick().await; // the zeroth tick completes immediately

    // Armed while a ping is outstanding; disarmed by any pong.
    let mut pong_deadline: Option<std::pin::Pin<Box<tokio::time::Sleep>>> = None;

    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        if text == "pong" {
                            pong_deadline = None;
                            continue;
                        }
                        match serde_json::from_str::<PushFrame>(&text) {
                            Ok(PushFrame::NewMessage { message }) => {
                                if cache.lock().await.insert(message.clone()) {
                                    let _ = message_tx.send(message);
                                }
                            }
                            Ok(PushFrame::Connected { workspace_id }) => {
                                debug!(workspace_id = %workspace_id, "push channel confirmed");
                            }
                            Err(err) => {
                                debug!(error = %err, "dropped unrecognized push frame");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        return classify_close(frame.as_ref());
                    }
                    None => {
                        return CloseReason::Transport("stream ended".to_string());
                    }
                    Some(Err(err)) => {
                        return CloseReason::Transport(err.to_string());
                    }
                    Some(Ok(_)) => {}
                }
            }
            cmd = command_rx.recv() => {
                match cmd {
                    Some(Command::Nudge) => {}
                    Some(Command::Disconnect) | None => {
                        *state.lock().await = SessionState::Closing;
                        let _ = write.send(WsMessage::Close(None)).await;
                        return CloseReason::LocalClose;
                    }
                }
            }
            _ = probe.tick() => {
                if write.send(WsMessage::Text("ping".to_string())).await.is_err() {
                    return CloseReason::Transport("failed to send liveness probe".to_string());
                }
                if pong_deadline.is_none() {
                    pong_deadline = Some(Box::pin(tokio::time::sleep(pong_timeout)));
                }
            }
            _ = async {
                match pong_deadline.as_mut() {
                    Some(deadline) => deadline.await,
                    None => std::future::pending().await,
                }
            } => {
                *state.lock().await = SessionState::Closing;
                let _ = write.send(WsMessage::Close(None)).await;
                return CloseReason::HeartbeatTimeout;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    fn close_frame(code: u16) -> CloseFrame<'static> {
        CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Borrowed(""),
        }
    }

    #[test]
    fn auth_close_codes_do_not_reconnect() {
        for code in [CLOSE_CODE_AUTH_FAILED, CLOSE_CODE_ACCESS_DENIED] {
            let frame = close_frame(code);
            let reason = classify_close(Some(&frame));
            assert_eq!(reason, CloseReason::AuthRejected);
            assert!(!reason.should_reconnect());
        }
    }

    #[test]
    fn normal_server_close_does_not_reconnect() {
        let frame = close_frame(1000);
        let reason = classify_close(Some(&frame));
        assert_eq!(reason, CloseReason::ServerClose(1000));
        assert!(!reason.should_reconnect());
    }

    #[test]
    fn abnormal_closes_reconnect() {
        let frame = close_frame(1006);
        assert!(classify_close(Some(&frame)).should_reconnect());
        assert!(classify_close(None).should_reconnect());
        assert!(CloseReason::HeartbeatTimeout.should_reconnect());
        assert!(CloseReason::Transport("reset".to_string()).should_reconnect());
    }

    #[test]
    fn local_close_is_terminal() {
        assert!(!CloseReason::LocalClose.should_reconnect());
    }
}
