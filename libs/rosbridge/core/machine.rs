//! Connection state machine
//!
//! One task per client owns every piece of mutable state: the socket, the
//! subscription registry, pending calls, status observers and the timers.
//! Everything that can change that state arrives through a single mailbox:
//!
//! ```text
//! BridgeClient ──Command──┐
//! Opener task ──Socket────┼──> mailbox ──> ConnectionMachine::run
//! Pump task ────Socket────┘                  │
//!                        Scheduler deadline ─┘
//! ```
//!
//! The machine only holds a weak sender to its own mailbox, so the task
//! ends once every client handle is gone.
//!
//! Every socket belongs to a generation. `connect` and `disconnect` bump the
//! generation, so events still in flight from an abandoned socket are
//! recognised and ignored.

use crate::core::codec::{InboundMessage, OutboundMessage};
use crate::core::config::{validate_endpoint, ClientConfig};
use crate::core::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::core::correlator::{CallCorrelator, ReplySlot};
use crate::core::registry::{ConsumerId, SubscriptionRegistry};
use crate::core::scheduler::{Scheduler, TimerId};
use crate::core::status::{ObserverId, StatusFanout};
use crate::traits::*;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Requests from the façade
pub(crate) enum Command {
    Connect,
    Disconnect,
    SetEndpoint {
        url: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SwitchEndpoint {
        url: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SetAutoReconnect(bool),
    ResetReconnectAttempts,
    Subscribe {
        topic: String,
        message_type: String,
        id: ConsumerId,
        handler: Box<dyn TopicHandler>,
    },
    Unsubscribe {
        topic: String,
        id: ConsumerId,
    },
    Publish {
        topic: String,
        message_type: String,
        msg: Value,
    },
    CallService {
        service: String,
        service_type: String,
        args: Value,
        timeout: Duration,
        reply: ReplySlot,
    },
    ObserveStatus {
        id: ObserverId,
        observer: Box<dyn StatusObserver>,
    },
    UnobserveStatus {
        id: ObserverId,
    },
    Shutdown,
}

/// What happened to the socket of one generation
pub(crate) enum SocketEvent {
    Opened(TransportSocket),
    OpenFailed(BridgeError),
    Transport(TransportEvent),
}

pub(crate) enum Envelope {
    Command(Command),
    Socket { generation: u64, event: SocketEvent },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TimerKey {
    Reconnect,
    CallDeadline(String),
}

/// State shared between the machine task and the façade
#[derive(Clone)]
pub(crate) struct SharedState {
    pub state: Arc<AtomicConnectionState>,
    pub metrics: Arc<AtomicMetrics>,
    pub endpoint: Arc<RwLock<String>>,
}

impl SharedState {
    pub fn new(url: &str) -> Self {
        Self {
            state: Arc::new(AtomicConnectionState::new(ConnectionState::Disconnected)),
            metrics: Arc::new(AtomicMetrics::default()),
            endpoint: Arc::new(RwLock::new(url.to_string())),
        }
    }
}

enum Flow {
    Continue,
    Stop,
}

pub(crate) struct ConnectionMachine {
    url: String,
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    resubscribe_on_reconnect: bool,

    generation: u64,
    socket: Option<mpsc::UnboundedSender<WsMessage>>,
    reconnect_timer: Option<TimerId>,

    scheduler: Scheduler<TimerKey>,
    registry: SubscriptionRegistry,
    correlator: CallCorrelator,
    status: StatusFanout,

    metrics: Arc<AtomicMetrics>,
    endpoint: Arc<RwLock<String>>,

    mailbox_tx: mpsc::WeakUnboundedSender<Envelope>,
    mailbox_rx: mpsc::UnboundedReceiver<Envelope>,
}

impl ConnectionMachine {
    pub fn new(
        config: ClientConfig,
        shared: &SharedState,
        mailbox_tx: mpsc::UnboundedSender<Envelope>,
        mailbox_rx: mpsc::UnboundedReceiver<Envelope>,
    ) -> Self {
        Self {
            url: config.url,
            transport: config.transport,
            policy: ReconnectPolicy::new(config.reconnect_strategy, config.auto_reconnect),
            resubscribe_on_reconnect: config.resubscribe_on_reconnect,
            generation: 0,
            socket: None,
            reconnect_timer: None,
            scheduler: Scheduler::new(),
            registry: SubscriptionRegistry::new(),
            correlator: CallCorrelator::new(),
            status: StatusFanout::new(Arc::clone(&shared.state)),
            metrics: Arc::clone(&shared.metrics),
            endpoint: Arc::clone(&shared.endpoint),
            mailbox_tx: mailbox_tx.downgrade(),
            mailbox_rx,
        }
    }

    /// Process mailbox messages and timers until shutdown
    pub async fn run(mut self) {
        debug!("Bridge client task started for {}", self.url);

        loop {
            let deadline = self.scheduler.next_deadline();

            tokio::select! {
                envelope = self.mailbox_rx.recv() => {
                    let Some(envelope) = envelope else {
                        debug!("All client handles dropped");
                        break;
                    };
                    if let Flow::Stop = self.handle(envelope) {
                        break;
                    }
                }
                _ = sleep_until(deadline) => self.fire_timers(),
            }
        }

        self.teardown();
        debug!("Bridge client task exiting");
    }

    fn handle(&mut self, envelope: Envelope) -> Flow {
        match envelope {
            Envelope::Command(command) => return self.handle_command(command),
            Envelope::Socket { generation, event } => {
                if generation != self.generation {
                    debug!(
                        generation,
                        current = self.generation,
                        "Ignoring event from stale socket"
                    );
                    return Flow::Continue;
                }
                match event {
                    SocketEvent::Opened(socket) => self.on_open(generation, socket),
                    SocketEvent::OpenFailed(e) => self.on_open_failed(e),
                    SocketEvent::Transport(TransportEvent::Frame(frame)) => self.on_frame(frame),
                    SocketEvent::Transport(TransportEvent::Error(e)) => self.on_socket_error(e),
                    SocketEvent::Transport(TransportEvent::Closed) => self.on_closed(),
                }
            }
        }
        Flow::Continue
    }

    fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnect("disconnect requested"),
            Command::SetEndpoint { url, reply } => {
                let _ = reply.send(self.set_endpoint(url));
            }
            Command::SwitchEndpoint { url, reply } => {
                let _ = reply.send(self.switch_endpoint(url));
            }
            Command::SetAutoReconnect(enabled) => {
                info!("Auto-reconnect {}", if enabled { "enabled" } else { "disabled" });
                self.policy.set_enabled(enabled);
                if !enabled {
                    self.cancel_reconnect();
                }
            }
            Command::ResetReconnectAttempts => {
                debug!("Reconnect attempts reset");
                self.policy.reset();
            }
            Command::Subscribe {
                topic,
                message_type,
                id,
                handler,
            } => {
                debug!(topic = %topic, id, "Adding topic consumer");
                if let Some(message) = self.registry.add(&topic, &message_type, id, handler) {
                    self.send(message);
                }
            }
            Command::Unsubscribe { topic, id } => {
                debug!(topic = %topic, id, "Removing topic consumer");
                if let Some(message) = self.registry.remove(&topic, id) {
                    self.send(message);
                }
            }
            Command::Publish {
                topic,
                message_type,
                msg,
            } => {
                if self.socket.is_none() {
                    warn!("Cannot publish to {}: not connected", topic);
                    self.metrics.increment_dropped_publishes();
                } else {
                    self.send(OutboundMessage::Publish {
                        topic,
                        message_type,
                        msg,
                    });
                }
            }
            Command::CallService {
                service,
                service_type,
                args,
                timeout,
                reply,
            } => self.call_service(service, service_type, args, timeout, reply),
            Command::ObserveStatus { id, observer } => self.status.observe(id, observer),
            Command::UnobserveStatus { id } => {
                self.status.unobserve(id);
            }
            Command::Shutdown => return Flow::Stop,
        }
        Flow::Continue
    }

    fn connect(&mut self) {
        let state = self.status.current();
        if matches!(state, ConnectionState::Connected | ConnectionState::Connecting) {
            debug!("Connect ignored: already {}", state);
            return;
        }

        self.cancel_reconnect();
        self.generation += 1;
        let generation = self.generation;

        info!("Connecting to bridge at {}", self.url);
        self.status.transition(ConnectionState::Connecting);

        let transport = Arc::clone(&self.transport);
        let url = self.url.clone();
        let mailbox = self.mailbox_tx.clone();
        tokio::spawn(async move {
            let event = match transport.open(&url).await {
                Ok(socket) => SocketEvent::Opened(socket),
                Err(e) => SocketEvent::OpenFailed(e),
            };
            // Machine may have shut down meanwhile
            if let Some(mailbox) = mailbox.upgrade() {
                let _ = mailbox.send(Envelope::Socket { generation, event });
            }
        });
    }

    fn disconnect(&mut self, reason: &str) {
        self.cancel_reconnect();
        self.generation += 1;
        if self.socket.is_some() {
            info!("Disconnecting from {}", self.url);
        }
        self.drop_socket(reason);
        self.status.transition(ConnectionState::Disconnected);
    }

    fn set_endpoint(&mut self, url: String) -> Result<()> {
        let state = self.status.current();
        if state != ConnectionState::Disconnected {
            return Err(BridgeError::InvalidState(format!(
                "endpoint can only be changed while disconnected (currently {})",
                state
            )));
        }
        validate_endpoint(&url)?;

        info!("Bridge endpoint set to {}", url);
        *self.endpoint.write() = url.clone();
        self.url = url;
        Ok(())
    }

    fn switch_endpoint(&mut self, url: String) -> Result<()> {
        validate_endpoint(&url)?;
        self.disconnect("switching endpoint");
        self.set_endpoint(url)?;
        self.policy.reset();
        self.connect();
        Ok(())
    }

    fn call_service(
        &mut self,
        service: String,
        service_type: String,
        args: Value,
        timeout: Duration,
        reply: ReplySlot,
    ) {
        let id = self.correlator.next_id();
        let timer = self
            .scheduler
            .schedule(deadline_after(timeout), TimerKey::CallDeadline(id.clone()));
        self.correlator
            .register(id.clone(), &service, timeout, timer, reply);

        debug!(id = %id, service = %service, "Calling service");
        // When not connected the request is lost and the deadline fails it
        self.send(OutboundMessage::CallService {
            service,
            service_type,
            args,
            id,
        });
    }

    fn on_open(&mut self, generation: u64, socket: TransportSocket) {
        let (outgoing, incoming) = socket.into_parts();
        self.socket = Some(outgoing);
        self.spawn_pump(generation, incoming);
        self.policy.reset();

        info!("Connected to bridge at {}", self.url);
        self.status.transition(ConnectionState::Connected);

        if self.resubscribe_on_reconnect {
            for message in self.registry.resubscribe_messages() {
                self.send(message);
            }
        }
    }

    fn on_open_failed(&mut self, e: BridgeError) {
        error!("Failed to connect to {}: {}", self.url, e);
        self.status.transition(ConnectionState::Error);
        self.schedule_reconnect();
    }

    fn on_frame(&mut self, frame: WsMessage) {
        self.metrics.increment_received();

        match InboundMessage::decode(&frame) {
            Ok(InboundMessage::Topic { topic, msg }) => {
                self.registry.dispatch(&topic, &msg);
            }
            Ok(InboundMessage::ServiceResponse { id, values }) => {
                if let Some(timer) = self.correlator.resolve(&id, values) {
                    self.scheduler.cancel(timer);
                }
            }
            Err(e) => {
                warn!("Discarding inbound frame: {}", e);
                self.metrics.increment_discarded();
            }
        }
    }

    fn on_socket_error(&mut self, e: String) {
        error!("Bridge connection error: {}", e);
        self.drop_socket("connection error");
        self.status.transition(ConnectionState::Error);
        self.schedule_reconnect();
    }

    fn on_closed(&mut self) {
        info!("Bridge connection to {} closed", self.url);
        self.drop_socket("connection closed");
        self.status.transition(ConnectionState::Disconnected);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect_timer.is_some() {
            return;
        }

        match self.policy.on_failure() {
            ReconnectDecision::Disabled => {
                debug!("Auto-reconnect disabled, not retrying");
            }
            ReconnectDecision::Retry { attempt, delay } => {
                info!("Reconnecting in {:?} (attempt {})", delay, attempt);
                self.metrics.increment_reconnects();
                self.reconnect_timer = Some(
                    self.scheduler
                        .schedule(deadline_after(delay), TimerKey::Reconnect),
                );
            }
            ReconnectDecision::GiveUp { attempts } => {
                warn!(
                    "Giving up after {} reconnect attempts; is the bridge server running at {}?",
                    attempts, self.url
                );
                self.status.transition(ConnectionState::Disconnected);
            }
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            self.scheduler.cancel(timer);
            debug!("Cancelled scheduled reconnect");
        }
    }

    fn fire_timers(&mut self) {
        for key in self.scheduler.pop_expired(Instant::now()) {
            match key {
                TimerKey::Reconnect => {
                    self.reconnect_timer = None;
                    self.connect();
                }
                TimerKey::CallDeadline(id) => {
                    if self.correlator.expire(&id) {
                        warn!("Service call {} timed out", id);
                        self.metrics.increment_timeouts();
                    }
                }
            }
        }
    }

    /// Close the current socket and fail every pending call
    fn drop_socket(&mut self, reason: &str) {
        self.socket = None;

        let timers = self.correlator.fail_all(reason);
        if !timers.is_empty() {
            warn!("Failing {} pending service calls: {}", timers.len(), reason);
        }
        for timer in timers {
            self.scheduler.cancel(timer);
        }
    }

    fn teardown(&mut self) {
        self.cancel_reconnect();
        self.generation += 1;
        self.drop_socket("client shut down");
        self.status.transition(ConnectionState::Disconnected);
    }

    fn send(&self, message: OutboundMessage) -> bool {
        let Some(socket) = self.socket.as_ref() else {
            warn!("Cannot send {} message: not connected", message.op());
            return false;
        };

        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode {} message: {}", message.op(), e);
                return false;
            }
        };

        if socket.send(frame).is_err() {
            warn!("Socket writer gone, {} message dropped", message.op());
            return false;
        }
        self.metrics.increment_sent();
        true
    }

    /// Forward socket events into the mailbox, tagged with their generation
    fn spawn_pump(&self, generation: u64, mut incoming: mpsc::UnboundedReceiver<TransportEvent>) {
        let mailbox = self.mailbox_tx.clone();
        tokio::spawn(async move {
            let forward = |event: TransportEvent| match mailbox.upgrade() {
                Some(mailbox) => mailbox
                    .send(Envelope::Socket {
                        generation,
                        event: SocketEvent::Transport(event),
                    })
                    .is_ok(),
                None => false,
            };

            while let Some(event) = incoming.recv().await {
                let terminal = event.is_terminal();
                if !forward(event) || terminal {
                    return;
                }
            }
            // Transport dropped its sender without a terminal event
            forward(TransportEvent::Closed);
        });
    }
}

/// Stand-in for delays too large to add to an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// `now + delay`, saturating to a far-future deadline instead of overflowing
fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or(now + FAR_FUTURE)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
