//! tokio-tungstenite implementation of [`Transport`]
//!
//! # Architecture
//!
//! ```text
//! outgoing (mpsc) ──> Writer Task ──> WebSocket sink
//! WebSocket stream ──> Reader Task ──> incoming (mpsc): Frame* then Error | Closed
//! ```
//!
//! Dropping the socket's `outgoing` sender makes the writer send a close
//! frame and exit; the reader then ends when the peer completes the close
//! handshake.

use crate::traits::*;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

/// WebSocket transport over tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn open(&self, url: &str) -> Result<TransportSocket> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| BridgeError::Transport(format!("failed to connect to {}: {}", url, e)))?;
        debug!("WebSocket handshake with {} complete", url);

        let (mut write, mut read) = ws_stream.split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<WsMessage>();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel::<TransportEvent>();

        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                if let Err(e) = write.send(ws_message_to_tungstenite(&msg)).await {
                    // The reader reports the failure as the socket's terminal event
                    warn!("WebSocket send failed: {}", e);
                    break;
                }
            }
            let _ = write.close().await;
            debug!("WebSocket writer exiting");
        });

        tokio::spawn(async move {
            let terminal = loop {
                match read.next().await {
                    Some(Ok(msg)) => {
                        if let Some(ws_msg) = tungstenite_to_ws_message(msg) {
                            if incoming_tx.send(TransportEvent::Frame(ws_msg)).is_err() {
                                debug!("Socket owner gone, stopping reader");
                                return;
                            }
                        }
                    }
                    Some(Err(e)) => break TransportEvent::Error(e.to_string()),
                    None => break TransportEvent::Closed,
                }
            };
            let _ = incoming_tx.send(terminal);
            debug!("WebSocket reader exiting");
        });

        Ok(TransportSocket::new(outgoing_tx, incoming_rx))
    }
}

/// Convert WsMessage to tungstenite Message
fn ws_message_to_tungstenite(msg: &WsMessage) -> Message {
    match msg {
        WsMessage::Text(text) => Message::Text(text.clone()),
        WsMessage::Binary(data) => Message::Binary(data.clone()),
    }
}

/// Convert tungstenite Message to WsMessage
///
/// Control frames are handled by tungstenite itself.
fn tungstenite_to_ws_message(msg: Message) -> Option<WsMessage> {
    match msg {
        Message::Text(text) => Some(WsMessage::Text(text)),
        Message::Binary(data) => Some(WsMessage::Binary(data)),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => None,
    }
}
