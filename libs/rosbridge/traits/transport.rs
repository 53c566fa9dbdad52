use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A single WebSocket data frame
/// Can be Text or Binary data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl WsMessage {
    /// Get the message as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(s) => Some(s),
            WsMessage::Binary(_) => None,
        }
    }

    /// Check if message is text
    pub fn is_text(&self) -> bool {
        matches!(self, WsMessage::Text(_))
    }
}

/// Event reported by an open socket
///
/// `Error` and `Closed` are terminal: a socket reports at most one of them
/// and nothing after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A data frame from the peer
    Frame(WsMessage),
    /// The socket failed at runtime
    Error(String),
    /// The peer closed the socket
    Closed,
}

impl TransportEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportEvent::Error(_) | TransportEvent::Closed)
    }
}

/// An open, full-duplex, message-oriented connection
///
/// Sending is fire-and-forget into `outgoing`; dropping the socket (and
/// with it the `outgoing` sender) closes the connection.
#[derive(Debug)]
pub struct TransportSocket {
    outgoing: mpsc::UnboundedSender<WsMessage>,
    incoming: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportSocket {
    pub fn new(
        outgoing: mpsc::UnboundedSender<WsMessage>,
        incoming: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { outgoing, incoming }
    }

    /// Split into the write half and the event stream
    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<WsMessage>,
        mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        (self.outgoing, self.incoming)
    }
}

/// Trait for opening connections to the broker
///
/// The connection state machine calls `open` from a spawned task, so a
/// slow handshake never blocks command processing.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a socket to `url`
    ///
    /// # Returns
    /// * `Ok(socket)` - Handshake completed
    /// * `Err(BridgeError::Transport)` - Connection could not be established
    async fn open(&self, url: &str) -> Result<TransportSocket>;
}
