use async_trait::async_trait;
use empathy_client::client::services::live_updates::LiveState;
use empathy_client::client::services::message_parser::{EventKind, ServerEvent};
use empathy_client::client::services::websocket_client::{
    ChannelClient, ChannelError, ConnectionStatus, Frame, FrameSink, FrameStream, Link, ReconnectPolicy, Transport,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

const AUTH_OK: &str = r#"{"event":"auth_response","data":{"success":true,"user_id":"u1"}}"#;

/// Server half of one fake link.
struct ServerEnd {
    to_client: mpsc::UnboundedSender<Frame>,
    from_client: mpsc::UnboundedReceiver<String>,
}

struct FakeSink(mpsc::UnboundedSender<String>);
struct FakeStream(mpsc::UnboundedReceiver<Frame>);

#[async_trait]
impl FrameSink for FakeSink {
    async fn send_text(&mut self, text: String) -> Result<(), ChannelError> {
        // A test that dropped its server end does not care what was sent.
        let _ = self.0.send(text);
        Ok(())
    }

    async fn close(&mut self) {}
}

#[async_trait]
impl FrameStream for FakeStream {
    async fn next_frame(&mut self) -> Option<Result<Frame, ChannelError>> {
        self.0.recv().await.map(Ok)
    }
}

/// Accepts the first `accept` opens and refuses every later one.
struct FakeTransport {
    opens: AtomicUsize,
    accept: usize,
    servers: mpsc::UnboundedSender<ServerEnd>,
}

impl FakeTransport {
    fn new(accept: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (servers, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { opens: AtomicUsize::new(0), accept, servers }), rx)
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, _url: &str) -> Result<Link, ChannelError> {
        let n = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        if n > self.accept {
            return Err(ChannelError::ConnectionFailed("connection refused".into()));
        }
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        let _ = to_client.send(Frame::Text(AUTH_OK.to_string()));
        let _ = self.servers.send(ServerEnd { to_client, from_client });
        Ok(Link {
            sink: Box::new(FakeSink(client_tx)),
            stream: Box::new(FakeStream(client_rx)),
        })
    }
}

async fn wait_for(client: &ChannelClient, wanted: ConnectionStatus) {
    let mut status = client.subscribe_status();
    status.wait_for(|s| *s == wanted).await.expect("status sender alive");
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_five_failed_reconnects() {
    let (transport, mut servers) = FakeTransport::new(1);
    let client = ChannelClient::with_transport("ws://fake", transport.clone(), ReconnectPolicy::default());

    client.connect("u1", "token").await.unwrap();
    assert_eq!(client.status(), ConnectionStatus::Connected);

    let server = servers.recv().await.unwrap();
    server.to_client.send(Frame::Close).unwrap();

    wait_for(&client, ConnectionStatus::ReconnectFailed).await;
    assert_eq!(transport.opens(), 6);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.opens(), 6);
    assert_eq!(client.status(), ConnectionStatus::ReconnectFailed);
    assert_eq!(client.reconnect().await, ConnectionStatus::ReconnectFailed);
    assert_eq!(transport.opens(), 6);
}

#[tokio::test(start_paused = true)]
async fn server_close_reconnects_and_rejoins_rooms() {
    let (transport, mut servers) = FakeTransport::new(2);
    let client = ChannelClient::with_transport("ws://fake", transport.clone(), ReconnectPolicy::default());

    client.connect("u1", "token").await.unwrap();
    assert!(client.join_room("post:p1").await);
    let first = servers.recv().await.unwrap();
    first.to_client.send(Frame::Close).unwrap();

    wait_for(&client, ConnectionStatus::Reconnecting(1)).await;
    wait_for(&client, ConnectionStatus::Connected).await;
    assert_eq!(transport.opens(), 2);

    let mut second = servers.recv().await.unwrap();
    let auth: serde_json::Value = serde_json::from_str(&second.from_client.recv().await.unwrap()).unwrap();
    assert_eq!(auth["event"], "auth");
    assert_eq!(auth["data"]["userId"], "u1");
    let rejoin: serde_json::Value = serde_json::from_str(&second.from_client.recv().await.unwrap()).unwrap();
    assert_eq!(rejoin["event"], "join_room");
    assert_eq!(rejoin["data"]["room"], "post:p1");
}

#[tokio::test(start_paused = true)]
async fn transport_error_waits_for_manual_reconnect() {
    let (transport, mut servers) = FakeTransport::new(2);
    let client = ChannelClient::with_transport("ws://fake", transport.clone(), ReconnectPolicy::default());

    client.connect("u1", "token").await.unwrap();
    drop(servers.recv().await.unwrap());

    wait_for(&client, ConnectionStatus::Disconnected).await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.opens(), 1);

    assert_eq!(client.reconnect().await, ConnectionStatus::Connected);
    assert_eq!(transport.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn rejected_auth_is_an_error() {
    struct Refusing;

    #[async_trait]
    impl Transport for Refusing {
        async fn open(&self, _url: &str) -> Result<Link, ChannelError> {
            let (to_client, rx) = mpsc::unbounded_channel();
            let (tx, _from_client) = mpsc::unbounded_channel();
            let _ = to_client.send(Frame::Text(
                r#"{"event":"auth_response","data":{"success":false,"error":"expired token"}}"#.into(),
            ));
            Ok(Link { sink: Box::new(FakeSink(tx)), stream: Box::new(FakeStream(rx)) })
        }
    }

    let client = ChannelClient::with_transport("ws://fake", Arc::new(Refusing), ReconnectPolicy::default());
    let err = client.connect("u1", "stale").await.unwrap_err();
    assert_eq!(err, ChannelError::AuthenticationFailed("expired token".into()));
    assert_eq!(client.status(), ConnectionStatus::Error);
}

#[tokio::test]
async fn websocket_round_trip_against_local_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        let auth = match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => text,
            other => panic!("expected auth text, got {:?}", other),
        };
        let auth: serde_json::Value = serde_json::from_str(&auth).unwrap();
        assert_eq!(auth["data"]["token"], "jwt");
        ws.send(Message::Text(AUTH_OK.into())).await.unwrap();

        ws.send(Message::Text(
            r#"{"event":"user_online","data":{"user_id":"u2","username":"grace"}}"#.into(),
        ))
        .await
        .unwrap();

        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(_)) => continue,
                other => panic!("socket ended early: {:?}", other),
            }
        }
    });

    let client = ChannelClient::new(format!("ws://{}", addr));
    let live = LiveState::new();
    live.attach(&client);
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    client.on(EventKind::UserOnline, move |event| {
        if let ServerEvent::UserOnline(user) = event {
            let _ = seen_tx.send(user.user_id.clone());
        }
    });

    client.connect("u1", "jwt").await.unwrap();
    let seen = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv()).await.unwrap();
    assert_eq!(seen.as_deref(), Some("u2"));
    assert!(live.is_online("u2"));

    assert!(client.join_room("post:p1").await);
    let frame = tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    let frame: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(frame["event"], "join_room");
    assert_eq!(frame["data"]["room"], "post:p1");

    client.disconnect().await;
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
}
