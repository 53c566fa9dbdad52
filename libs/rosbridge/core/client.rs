use crate::core::config::ClientConfig;
use crate::core::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::core::machine::{Command, ConnectionMachine, Envelope, SharedState};
use crate::core::registry::ConsumerId;
use crate::core::status::ObserverId;
use crate::core::builder::{states::NoUrl, BridgeClientBuilder};
use crate::traits::*;
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

/// Client metrics snapshot
#[derive(Debug, Clone)]
pub struct Metrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reconnect_count: u64,
    pub frames_discarded: u64,
    pub publishes_dropped: u64,
    pub calls_timed_out: u64,
    pub connection_state: ConnectionState,
}

/// Client for a rosbridge-style pub/sub/RPC broker
///
/// All operations are non-blocking requests to the client's state machine
/// task, processed in the order they were issued. The handle is cheap to
/// clone; the task stops when [`shutdown`](Self::shutdown) is called or the
/// last clone is dropped.
///
/// Consumers and observers run on the client task. Offload heavy work with
/// [`subscribe_channel`](Self::subscribe_channel).
#[derive(Clone)]
pub struct BridgeClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    commands: mpsc::UnboundedSender<Envelope>,
    state: Arc<AtomicConnectionState>,
    metrics: Arc<AtomicMetrics>,
    endpoint: Arc<RwLock<String>>,
    call_timeout: Duration,
    next_handle: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let _ = self.commands.send(Envelope::Command(Command::Shutdown));
    }
}

impl BridgeClient {
    /// Start building a client
    pub fn builder() -> BridgeClientBuilder<NoUrl> {
        BridgeClientBuilder::new()
    }

    /// Spawn the state machine task on `runtime`
    ///
    /// This is called by the builder's `build()` method.
    pub(crate) fn spawn(config: ClientConfig, runtime: &tokio::runtime::Handle) -> Self {
        let shared = SharedState::new(&config.url);
        let call_timeout = config.call_timeout;
        let (commands, mailbox) = mpsc::unbounded_channel();

        let machine = ConnectionMachine::new(config, &shared, commands.clone(), mailbox);
        let task = runtime.spawn(machine.run());

        Self {
            inner: Arc::new(ClientInner {
                commands,
                state: shared.state,
                metrics: shared.metrics,
                endpoint: shared.endpoint,
                call_timeout,
                next_handle: AtomicU64::new(1),
                task: Mutex::new(Some(task)),
            }),
        }
    }

    fn command(&self, command: Command) {
        if self.inner.commands.send(Envelope::Command(command)).is_err() {
            debug!("Bridge client task has stopped, command ignored");
        }
    }

    fn next_handle(&self) -> u64 {
        self.inner.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    /// Open the connection if not already connected or connecting
    ///
    /// Also cancels any scheduled reconnect.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close the connection and cancel any scheduled reconnect
    ///
    /// Pending service calls fail with `ConnectionLost`.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Change the broker URL; only allowed while disconnected
    ///
    /// # Errors
    /// * `InvalidState` - The client is not disconnected
    /// * `Configuration` - The URL is not a ws:// or wss:// URL
    pub async fn set_endpoint(&self, url: impl Into<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::SetEndpoint {
            url: url.into(),
            reply,
        });
        rx.await.unwrap_or(Err(BridgeError::Shutdown))
    }

    /// Disconnect, change the broker URL, reset reconnect attempts, and connect
    pub async fn switch_endpoint(&self, url: impl Into<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::SwitchEndpoint {
            url: url.into(),
            reply,
        });
        rx.await.unwrap_or(Err(BridgeError::Shutdown))
    }

    /// Current broker URL
    pub fn endpoint(&self) -> String {
        self.inner.endpoint.read().clone()
    }

    /// Enable or disable automatic reconnection
    ///
    /// Disabling cancels a scheduled reconnect.
    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.command(Command::SetAutoReconnect(enabled));
    }

    pub fn reset_reconnect_attempts(&self) {
        self.command(Command::ResetReconnectAttempts);
    }

    /// Register a consumer for `topic`
    ///
    /// The first consumer of a topic sends one `subscribe` to the broker
    /// (only if connected at that moment). Later consumers share it.
    pub fn subscribe<H>(
        &self,
        topic: impl Into<String>,
        message_type: impl Into<String>,
        handler: H,
    ) -> SubscriptionHandle
    where
        H: TopicHandler,
    {
        let topic = topic.into();
        let id = self.next_handle();
        self.command(Command::Subscribe {
            topic: topic.clone(),
            message_type: message_type.into(),
            id,
            handler: Box::new(handler),
        });
        SubscriptionHandle {
            topic,
            id,
            commands: self.inner.commands.clone(),
        }
    }

    /// Subscribe and receive payloads through a crossbeam channel
    ///
    /// Suited to consumers that process messages on their own thread.
    pub fn subscribe_channel(
        &self,
        topic: impl Into<String>,
        message_type: impl Into<String>,
    ) -> (SubscriptionHandle, Receiver<Value>) {
        let topic = topic.into();
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = self.subscribe(topic.clone(), message_type, ChannelForwarder::new(topic, tx));
        (handle, rx)
    }

    /// Remove one consumer
    ///
    /// The last consumer of a topic sends one `unsubscribe`. Unknown or
    /// already removed handles are ignored.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        handle.unsubscribe();
    }

    /// Publish `msg` on `topic`
    ///
    /// Dropped with a warning when not connected.
    pub fn publish(&self, topic: impl Into<String>, message_type: impl Into<String>, msg: Value) {
        self.command(Command::Publish {
            topic: topic.into(),
            message_type: message_type.into(),
            msg,
        });
    }

    /// Call a service with the configured default timeout
    pub fn call_service(
        &self,
        service: impl Into<String>,
        service_type: impl Into<String>,
        args: Value,
    ) -> ServiceCall {
        self.call_service_with_timeout(service, service_type, args, self.inner.call_timeout)
    }

    /// Call a service; the returned future resolves exactly once
    ///
    /// # Returns
    /// * `Ok(values)` - The broker's response
    /// * `Err(Timeout)` - No response within `timeout`
    /// * `Err(ConnectionLost)` - The connection closed first
    pub fn call_service_with_timeout(
        &self,
        service: impl Into<String>,
        service_type: impl Into<String>,
        args: Value,
        timeout: Duration,
    ) -> ServiceCall {
        let (reply, rx) = oneshot::channel();
        self.command(Command::CallService {
            service: service.into(),
            service_type: service_type.into(),
            args,
            timeout,
            reply,
        });
        ServiceCall { rx }
    }

    /// Register a status observer; it is notified of the current state first
    pub fn observe_status<O>(&self, observer: O) -> StatusHandle
    where
        O: StatusObserver,
    {
        let id = self.next_handle();
        self.command(Command::ObserveStatus {
            id,
            observer: Box::new(observer),
        });
        StatusHandle {
            id,
            commands: self.inner.commands.clone(),
        }
    }

    /// Current connection state
    #[inline]
    pub fn status(&self) -> ConnectionState {
        self.inner.state.get()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.inner.state.is_connected()
    }

    pub fn metrics(&self) -> Metrics {
        let metrics = &self.inner.metrics;
        Metrics {
            messages_sent: metrics.messages_sent(),
            messages_received: metrics.messages_received(),
            reconnect_count: metrics.reconnect_count(),
            frames_discarded: metrics.frames_discarded(),
            publishes_dropped: metrics.publishes_dropped(),
            calls_timed_out: metrics.calls_timed_out(),
            connection_state: self.inner.state.get(),
        }
    }

    /// Stop the client task and wait for it to exit
    ///
    /// The connection is closed and pending calls fail with
    /// `ConnectionLost`. Later operations on any clone are ignored.
    pub async fn shutdown(&self) {
        self.command(Command::Shutdown);
        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                debug!("Bridge client task ended abnormally: {}", e);
            }
        }
    }
}

/// Pending service call result
///
/// Dropping it abandons the result; the call still completes internally.
pub struct ServiceCall {
    rx: oneshot::Receiver<Result<Value>>,
}

impl Future for ServiceCall {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|reply| {
            reply.unwrap_or_else(|_| {
                Err(BridgeError::ConnectionLost(
                    "bridge client shut down before the call completed".to_string(),
                ))
            })
        })
    }
}

/// Token for one topic consumer
#[must_use = "the consumer stays registered until unsubscribe() is called"]
#[derive(Debug)]
pub struct SubscriptionHandle {
    topic: String,
    id: ConsumerId,
    commands: mpsc::UnboundedSender<Envelope>,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    /// Remove this consumer
    pub fn unsubscribe(self) {
        let _ = self.commands.send(Envelope::Command(Command::Unsubscribe {
            topic: self.topic,
            id: self.id,
        }));
    }
}

/// Token for one status observer
#[must_use = "the observer stays registered until unobserve() is called"]
#[derive(Debug)]
pub struct StatusHandle {
    id: ObserverId,
    commands: mpsc::UnboundedSender<Envelope>,
}

impl StatusHandle {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn unobserve(self) {
        let _ = self
            .commands
            .send(Envelope::Command(Command::UnobserveStatus { id: self.id }));
    }
}
