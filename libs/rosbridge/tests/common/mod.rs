//! Common test utilities for rosbridge integration tests
//!
//! - [`MockTransport`]: in-memory sockets scripted by the test
//! - [`StatusLog`]: timestamped status transitions
//! - [`MockWsServer`]: a tiny rosbridge-speaking WebSocket server

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rosbridge::{
    BridgeClient, BridgeError, ConnectionState, Result, StatusHandle, Transport, TransportEvent,
    TransportSocket, WsMessage,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Transport whose sockets are in-memory channel pairs
///
/// Every accepted open hands the broker side of the socket to the test as
/// a [`MockPeer`].
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

struct MockInner {
    refuse_all: AtomicBool,
    refuse_next: AtomicUsize,
    opens: Mutex<Vec<String>>,
    peers_tx: mpsc::UnboundedSender<MockPeer>,
    peers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockPeer>>,
}

impl MockTransport {
    pub fn new() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MockInner {
                refuse_all: AtomicBool::new(false),
                refuse_next: AtomicUsize::new(0),
                opens: Mutex::new(Vec::new()),
                peers_tx,
                peers_rx: tokio::sync::Mutex::new(peers_rx),
            }),
        }
    }

    /// Transport that refuses every open
    pub fn refusing() -> Self {
        let transport = Self::new();
        transport.set_refusing(true);
        transport
    }

    pub fn set_refusing(&self, refusing: bool) {
        self.inner.refuse_all.store(refusing, Ordering::SeqCst);
    }

    /// Refuse the next `n` opens, then go back to the default
    pub fn refuse_next(&self, n: usize) {
        self.inner.refuse_next.store(n, Ordering::SeqCst);
    }

    /// Number of open attempts so far
    pub fn open_count(&self) -> usize {
        self.inner.opens.lock().len()
    }

    /// URLs of all open attempts, in order
    pub fn opened_urls(&self) -> Vec<String> {
        self.inner.opens.lock().clone()
    }

    /// Wait for the next accepted socket
    pub async fn next_peer(&self) -> MockPeer {
        let mut peers = self.inner.peers_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(60), peers.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("transport dropped")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, url: &str) -> Result<TransportSocket> {
        self.inner.opens.lock().push(url.to_string());

        let refuse_one = self
            .inner
            .refuse_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refuse_one || self.inner.refuse_all.load(Ordering::SeqCst) {
            return Err(BridgeError::Transport(format!("connection refused: {}", url)));
        }

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let _ = self.inner.peers_tx.send(MockPeer {
            outbound: outgoing_rx,
            inbound: incoming_tx,
        });
        Ok(TransportSocket::new(outgoing_tx, incoming_rx))
    }
}

/// Broker side of an in-memory socket
pub struct MockPeer {
    outbound: mpsc::UnboundedReceiver<WsMessage>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
}

impl MockPeer {
    /// Next frame the client sent, parsed as JSON
    pub async fn recv_json(&mut self) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(60), self.outbound.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("client closed the socket");
        let text = frame.as_text().expect("client sent a binary frame");
        serde_json::from_str(text).expect("client sent invalid JSON")
    }

    /// A frame the client already sent, if any
    pub fn try_recv_json(&mut self) -> Option<Value> {
        let frame = self.outbound.try_recv().ok()?;
        serde_json::from_str(frame.as_text()?).ok()
    }

    /// Wait until the client drops its side of the socket
    pub async fn wait_closed_by_client(&mut self) {
        loop {
            let next = tokio::time::timeout(Duration::from_secs(60), self.outbound.recv())
                .await
                .expect("client kept the socket open");
            if next.is_none() {
                return;
            }
        }
    }

    pub fn send_json(&self, value: Value) {
        self.send_text(value.to_string());
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self
            .inbound
            .send(TransportEvent::Frame(WsMessage::Text(text.into())));
    }

    pub fn send_binary(&self, data: Vec<u8>) {
        let _ = self.inbound.send(TransportEvent::Frame(WsMessage::Binary(data)));
    }

    /// Publish `msg` on `topic` from the broker side
    pub fn publish(&self, topic: &str, msg: Value) {
        self.send_json(json!({"op": "publish", "topic": topic, "msg": msg}));
    }

    pub fn respond(&self, id: &str, values: Value) {
        self.send_json(json!({"op": "service_response", "id": id, "values": values, "result": true}));
    }

    /// Peer closes the socket
    pub fn close(&self) {
        let _ = self.inbound.send(TransportEvent::Closed);
    }

    /// Socket fails at runtime
    pub fn fail(&self, reason: &str) {
        let _ = self.inbound.send(TransportEvent::Error(reason.to_string()));
    }
}

/// Status transitions recorded with the (tokio) time they happened
pub struct StatusLog {
    rx: mpsc::UnboundedReceiver<(ConnectionState, Instant)>,
    handle: Option<StatusHandle>,
}

impl StatusLog {
    pub fn attach(client: &BridgeClient) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = client.observe_status(move |status: ConnectionState| {
            let _ = tx.send((status, Instant::now()));
        });
        Self {
            rx,
            handle: Some(handle),
        }
    }

    pub async fn next(&mut self) -> (ConnectionState, Instant) {
        tokio::time::timeout(Duration::from_secs(600), self.rx.recv())
            .await
            .expect("timed out waiting for a status")
            .expect("status observer dropped")
    }

    pub async fn next_state(&mut self) -> ConnectionState {
        self.next().await.0
    }

    /// Skip statuses until `state` is reported
    pub async fn wait_for(&mut self, state: ConnectionState) -> Instant {
        loop {
            let (status, at) = self.next().await;
            if status == state {
                return at;
            }
        }
    }

    /// Statuses reported so far that have not been consumed
    pub fn drain(&mut self) -> Vec<ConnectionState> {
        let mut states = Vec::new();
        while let Ok((status, _)) = self.rx.try_recv() {
            states.push(status);
        }
        states
    }

    pub fn detach(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.unobserve();
        }
    }
}

/// Build a client over `transport` with test-friendly defaults
pub fn client_with(transport: &MockTransport) -> BridgeClient {
    BridgeClient::builder()
        .url("ws://bridge.test:9090")
        .transport(transport.clone())
        .build()
        .unwrap()
}

/// Let the client task drain its mailbox
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// A minimal rosbridge server for end-to-end tests
///
/// - `subscribe` is answered with one greeting message on the topic
/// - `publish` is looped back to the publisher as a topic message
/// - `call_service` is answered with its own `args` as `values`
pub struct MockWsServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl MockWsServer {
    /// Create and start a new mock server
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let shutdown = shutdown_clone.clone();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, shutdown).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self { addr, shutdown }
    }

    async fn handle_connection(stream: tokio::net::TcpStream, shutdown: Arc<Notify>) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::accept_async;
        use tokio_tungstenite::tungstenite::Message;

        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => continue,
                    };
                    let Some(reply) = Self::reply_to(&text) else { continue };
                    if write.send(Message::Text(reply.to_string())).await.is_err() {
                        break;
                    }
                }
                _ = shutdown.notified() => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    fn reply_to(text: &str) -> Option<Value> {
        let request: Value = serde_json::from_str(text).ok()?;
        match request["op"].as_str()? {
            "subscribe" => Some(json!({
                "op": "publish",
                "topic": request["topic"],
                "msg": {"data": "hello"}
            })),
            "publish" => Some(json!({
                "op": "publish",
                "topic": request["topic"],
                "msg": request["msg"]
            })),
            "call_service" => Some(json!({
                "op": "service_response",
                "id": request["id"],
                "values": request["args"],
                "result": true
            })),
            _ => None,
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
