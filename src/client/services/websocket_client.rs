//! Real-time channel client.
//!
//! One persistent connection per signed-in session. Incoming frames are
//! parsed into typed [`ServerEvent`]s and fanned out to registered handlers
//! in registration order. Sending never queues: if the channel is not
//! connected the event is dropped and `send_message` returns false.
//!
//! Status moves through
//! `Disconnected -> Connecting -> Connected -> (Disconnected | Reconnecting(n) -> Connected | ReconnectFailed)`.
//! A server-initiated close starts the bounded reconnect loop on its own;
//! any other loss leaves the client `Disconnected` until the caller runs
//! [`ChannelClient::reconnect`]. `ReconnectFailed` is terminal until the
//! next explicit [`ChannelClient::connect`].

use crate::client::services::message_parser::{self, ClientEvent, EventKind, Inbound, ServerEvent};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("No credentials, call connect first")]
    MissingCredentials,

    #[error("Operation timed out")]
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting(u32),
    ReconnectFailed,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting(_) => "reconnecting",
            ConnectionStatus::ReconnectFailed => "reconnect_failed",
            ConnectionStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the channel ("io server disconnect").
    ServerDisconnect,
    /// `disconnect()` was called locally.
    ClientDisconnect,
    TransportError(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub auth_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            auth_timeout: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    /// Linear backoff: attempt `n` waits `n * base_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

// Transport seam

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
}

#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), ChannelError>;
    async fn close(&mut self);
}

#[async_trait]
pub trait FrameStream: Send {
    /// `None` once the underlying stream has ended.
    async fn next_frame(&mut self) -> Option<Result<Frame, ChannelError>>;
}

pub struct Link {
    pub sink: Box<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &str) -> Result<Link, ChannelError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

struct WsSink(SplitSink<WsStream, Message>);
struct WsSource(SplitStream<WsStream>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), ChannelError> {
        self.0
            .send(Message::Text(text))
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.0.close().await;
    }
}

#[async_trait]
impl FrameStream for WsSource {
    async fn next_frame(&mut self) -> Option<Result<Frame, ChannelError>> {
        loop {
            match self.0.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                Ok(Message::Close(_)) => return Some(Ok(Frame::Close)),
                // binary, ping, pong
                Ok(_) => continue,
                Err(e) => return Some(Err(ChannelError::ConnectionFailed(e.to_string()))),
            }
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<Link, ChannelError> {
        let url = Url::parse(url).map_err(|e| ChannelError::ConnectionFailed(format!("invalid url {}: {}", url, e)))?;
        log::info!("[WS:CLIENT] Connecting to {}", url);
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;
        let (sink, stream) = ws_stream.split();
        Ok(Link {
            sink: Box::new(WsSink(sink)),
            stream: Box::new(WsSource(stream)),
        })
    }
}

// Handlers

pub type EventHandler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
struct HandlerRegistry {
    next_id: u64,
    by_kind: HashMap<EventKind, Vec<(HandlerId, EventHandler)>>,
}

#[derive(Debug, Clone)]
struct Credentials {
    user_id: String,
    token: String,
}

#[derive(Default)]
struct LinkState {
    credentials: Option<Credentials>,
    rooms: BTreeSet<String>,
    driver: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
}

struct Inner {
    url: String,
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    status_tx: watch::Sender<ConnectionStatus>,
    handlers: StdMutex<HandlerRegistry>,
    outgoing: StdMutex<Option<mpsc::UnboundedSender<String>>>,
    /// Bumped for every new link and on disconnect, so a finished driver
    /// cannot tear down a newer link.
    generation: AtomicU64,
    link: Mutex<LinkState>,
}

#[derive(Clone)]
pub struct ChannelClient {
    inner: Arc<Inner>,
}

impl ChannelClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_transport(url, Arc::new(WebSocketTransport), ReconnectPolicy::default())
    }

    pub fn with_transport(url: impl Into<String>, transport: Arc<dyn Transport>, policy: ReconnectPolicy) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                transport,
                policy,
                status_tx,
                handlers: StdMutex::new(HandlerRegistry::default()),
                outgoing: StdMutex::new(None),
                generation: AtomicU64::new(0),
                link: Mutex::new(LinkState::default()),
            }),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status_tx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    fn set_status(&self, status: ConnectionStatus) {
        log::debug!("[WS:CLIENT] status -> {}", status.as_str());
        self.inner.status_tx.send_replace(status);
    }

    /// Opens the channel for `user_id`. Does nothing when already connected
    /// or connecting. Also the only way out of `ReconnectFailed`.
    pub async fn connect(&self, user_id: &str, token: &str) -> Result<(), ChannelError> {
        if matches!(self.status(), ConnectionStatus::Connected | ConnectionStatus::Connecting) {
            return Ok(());
        }
        let mut link = self.inner.link.lock().await;
        if matches!(self.status(), ConnectionStatus::Connected | ConnectionStatus::Connecting) {
            return Ok(());
        }
        if let Some(task) = link.reconnect_task.take() {
            task.abort();
        }
        link.credentials = Some(Credentials {
            user_id: user_id.to_string(),
            token: token.to_string(),
        });
        self.set_status(ConnectionStatus::Connecting);
        match self.establish(&mut link).await {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("[WS:CLIENT] Connect failed: {}", e);
                self.set_status(ConnectionStatus::Error);
                Err(e)
            }
        }
    }

    /// Client-initiated close. Forgets credentials so nothing reconnects.
    pub async fn disconnect(&self) {
        let mut link = self.inner.link.lock().await;
        link.credentials = None;
        if let Some(task) = link.reconnect_task.take() {
            task.abort();
        }
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        // Dropping the sender lets the driver close the socket and exit.
        self.take_outgoing();
        link.driver = None;
        self.set_status(ConnectionStatus::Disconnected);
        log::info!("[WS:CLIENT] Disconnected by client");
    }

    /// Runs the bounded reconnect loop in the caller's task and returns the
    /// resulting status. Once attempts are exhausted only `connect` recovers.
    pub async fn reconnect(&self) -> ConnectionStatus {
        match self.status() {
            status @ (ConnectionStatus::Connected | ConnectionStatus::ReconnectFailed) => return status,
            _ => {}
        }
        self.run_reconnect().await;
        self.status()
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let mut registry = match self.inner.handlers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        registry.next_id += 1;
        let id = HandlerId(registry.next_id);
        registry.by_kind.entry(kind).or_default().push((id, Arc::new(handler)));
        id
    }

    /// Removes one handler. Returns false if it was not registered.
    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        let mut registry = match self.inner.handlers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match registry.by_kind.get_mut(&kind) {
            Some(list) => {
                let before = list.len();
                list.retain(|(h, _)| *h != id);
                before != list.len()
            }
            None => false,
        }
    }

    fn dispatch(&self, event: &ServerEvent) {
        // Snapshot so handlers may call on/off without deadlocking.
        let handlers: Vec<EventHandler> = match self.inner.handlers.lock() {
            Ok(registry) => registry
                .by_kind
                .get(&event.kind())
                .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default(),
            Err(_) => return,
        };
        for handler in handlers {
            handler(event);
        }
    }

    /// Emits an event. Returns false, without queuing, when not connected.
    pub fn send_message(&self, event: &ClientEvent) -> bool {
        if !self.is_connected() {
            log::debug!("[WS:CLIENT] Dropping {} while {}", event.name(), self.status().as_str());
            return false;
        }
        let text = match event.encode() {
            Ok(text) => text,
            Err(e) => {
                log::error!("[WS:CLIENT] Failed to serialize {}: {}", event.name(), e);
                return false;
            }
        };
        let guard = match self.inner.outgoing.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        match guard.as_ref() {
            Some(tx) => tx.send(text).is_ok(),
            None => false,
        }
    }

    /// Joins a room. The membership is remembered and replayed after a reconnect.
    pub async fn join_room(&self, room: &str) -> bool {
        self.inner.link.lock().await.rooms.insert(room.to_string());
        self.send_message(&ClientEvent::JoinRoom { room: room.to_string() })
    }

    pub async fn leave_room(&self, room: &str) -> bool {
        self.inner.link.lock().await.rooms.remove(room);
        self.send_message(&ClientEvent::LeaveRoom { room: room.to_string() })
    }

    pub async fn rooms(&self) -> Vec<String> {
        self.inner.link.lock().await.rooms.iter().cloned().collect()
    }

    fn take_outgoing(&self) -> Option<mpsc::UnboundedSender<String>> {
        match self.inner.outgoing.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn store_outgoing(&self, tx: mpsc::UnboundedSender<String>) {
        match self.inner.outgoing.lock() {
            Ok(mut guard) => *guard = Some(tx),
            Err(poisoned) => *poisoned.into_inner() = Some(tx),
        }
    }

    /// Opens the transport, authenticates and starts the driver task.
    async fn establish(&self, link: &mut LinkState) -> Result<(), ChannelError> {
        let credentials = link.credentials.clone().ok_or(ChannelError::MissingCredentials)?;
        let Link { mut sink, mut stream } = self.inner.transport.open(&self.inner.url).await?;

        let auth = ClientEvent::Auth {
            token: credentials.token.clone(),
            user_id: credentials.user_id.clone(),
        };
        let auth_json = auth
            .encode()
            .map_err(|e| ChannelError::AuthenticationFailed(format!("Failed to serialize auth message: {}", e)))?;
        sink.send_text(auth_json).await?;

        let reply = tokio::time::timeout(self.inner.policy.auth_timeout, stream.next_frame()).await;
        match reply {
            Ok(Some(Ok(Frame::Text(text)))) => match message_parser::parse_frame(&text) {
                Ok(Inbound::AuthResponse(resp)) if resp.success => {
                    log::info!("[WS:CLIENT] Authenticated as {}", credentials.user_id);
                }
                Ok(Inbound::AuthResponse(resp)) => {
                    let reason = resp.error.unwrap_or_else(|| "Unknown authentication error".to_string());
                    return Err(ChannelError::AuthenticationFailed(reason));
                }
                Ok(_) => {
                    return Err(ChannelError::AuthenticationFailed("Unexpected frame during auth".to_string()));
                }
                Err(e) => return Err(ChannelError::AuthenticationFailed(e)),
            },
            Ok(Some(Ok(Frame::Close))) | Ok(None) => {
                return Err(ChannelError::AuthenticationFailed("Connection closed during auth".to_string()));
            }
            Ok(Some(Err(e))) => return Err(e),
            Err(_) => return Err(ChannelError::Timeout),
        }

        let (tx, rx) = mpsc::unbounded_channel::<String>();
        for room in &link.rooms {
            if let Ok(text) = (ClientEvent::JoinRoom { room: room.clone() }).encode() {
                let _ = tx.send(text);
            }
        }
        self.store_outgoing(tx);
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_status(ConnectionStatus::Connected);

        let client = self.clone();
        link.driver = Some(tokio::spawn(async move {
            let reason = Self::drive(&client, sink, stream, rx).await;
            client.handle_disconnect(generation, reason).await;
        }));
        Ok(())
    }

    async fn drive(
        client: &ChannelClient,
        mut sink: Box<dyn FrameSink>,
        mut stream: Box<dyn FrameStream>,
        mut outgoing: mpsc::UnboundedReceiver<String>,
    ) -> DisconnectReason {
        loop {
            tokio::select! {
                out = outgoing.recv() => match out {
                    Some(text) => {
                        if let Err(e) = sink.send_text(text).await {
                            log::warn!("[WS:CLIENT] Send failed: {}", e);
                            return DisconnectReason::TransportError(e.to_string());
                        }
                    }
                    None => {
                        sink.close().await;
                        return DisconnectReason::ClientDisconnect;
                    }
                },
                frame = stream.next_frame() => match frame {
                    Some(Ok(Frame::Text(text))) => match message_parser::parse_frame(&text) {
                        Ok(Inbound::Event(event)) => client.dispatch(&event),
                        Ok(Inbound::Unknown(name)) => log::debug!("[WS:CLIENT] Ignoring event {}", name),
                        Ok(Inbound::AuthResponse(_)) => {}
                        Err(e) => log::warn!("[WS:CLIENT] Failed to parse frame: {}", e),
                    },
                    Some(Ok(Frame::Close)) => {
                        log::info!("[WS:CLIENT] Connection closed by server");
                        return DisconnectReason::ServerDisconnect;
                    }
                    Some(Err(e)) => {
                        log::warn!("[WS:CLIENT] Channel error: {}", e);
                        return DisconnectReason::TransportError(e.to_string());
                    }
                    None => return DisconnectReason::TransportError("stream ended".to_string()),
                },
            }
        }
    }

    async fn handle_disconnect(&self, generation: u64, reason: DisconnectReason) {
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        self.take_outgoing();
        match reason {
            DisconnectReason::ClientDisconnect => {}
            DisconnectReason::ServerDisconnect => {
                self.set_status(ConnectionStatus::Disconnected);
                let task = tokio::spawn(self.run_reconnect());
                let mut link = self.inner.link.lock().await;
                link.driver = None;
                link.reconnect_task = Some(task);
            }
            DisconnectReason::TransportError(e) => {
                log::warn!("[WS:CLIENT] Connection lost ({}), waiting for manual reconnect", e);
                self.set_status(ConnectionStatus::Disconnected);
                self.inner.link.lock().await.driver = None;
            }
        }
    }

    // Boxed to break the establish -> driver -> reconnect type cycle.
    fn run_reconnect(&self) -> BoxFuture<'static, ()> {
        let client = self.clone();
        async move { client.reconnect_loop().await }.boxed()
    }

    async fn reconnect_loop(&self) {
        let policy = self.inner.policy;
        for attempt in 1..=policy.max_attempts {
            self.set_status(ConnectionStatus::Reconnecting(attempt));
            let delay = policy.delay_for(attempt);
            log::info!("[WS:CLIENT] Reconnect attempt {}/{} in {:?}", attempt, policy.max_attempts, delay);
            tokio::time::sleep(delay).await;

            let mut link = self.inner.link.lock().await;
            if link.credentials.is_none() {
                self.set_status(ConnectionStatus::Disconnected);
                return;
            }
            match self.establish(&mut link).await {
                Ok(()) => {
                    log::info!("[WS:CLIENT] Reconnected after {} attempt(s)", attempt);
                    return;
                }
                Err(e) => log::warn!("[WS:CLIENT] Reconnect attempt {} failed: {}", attempt, e),
            }
        }
        log::error!("[WS:CLIENT] Giving up after {} reconnect attempts", policy.max_attempts);
        self.set_status(ConnectionStatus::ReconnectFailed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_linear() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(3));
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn status_names_match_the_channel_vocabulary() {
        assert_eq!(ConnectionStatus::Reconnecting(2).as_str(), "reconnecting");
        assert_eq!(ConnectionStatus::ReconnectFailed.as_str(), "reconnect_failed");
    }

    #[tokio::test]
    async fn send_without_connection_returns_false() {
        let client = ChannelClient::new("ws://127.0.0.1:9");
        assert!(!client.send_message(&ClientEvent::JoinRoom { room: "feed".into() }));
        assert!(!client.join_room("feed").await);
        assert_eq!(client.rooms().await, vec!["feed".to_string()]);
    }

    #[test]
    fn handlers_run_in_registration_order_and_can_be_removed() {
        let client = ChannelClient::new("ws://127.0.0.1:9");
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let first = seen.clone();
        client.on(EventKind::PostDeleted, move |_| first.lock().unwrap().push("first"));
        let second = seen.clone();
        let id = client.on(EventKind::PostDeleted, move |_| second.lock().unwrap().push("second"));

        let event = ServerEvent::PostDeleted(message_parser::PostDeleted { post_id: "p1".into() });
        client.dispatch(&event);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);

        assert!(client.off(EventKind::PostDeleted, id));
        assert!(!client.off(EventKind::PostDeleted, id));
        client.dispatch(&event);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "first"]);
    }
}
