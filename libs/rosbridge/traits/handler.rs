//! Consumer callbacks
//!
//! Topic consumers and status observers run on the client's event task,
//! sequentially and in registration order. Keep them short: a slow
//! callback delays every other event of the same client. For heavy work,
//! forward into a channel (see [`ChannelForwarder`]) and process on a
//! dedicated thread.

use crate::core::connection_state::ConnectionState;
use crate::error::{BridgeError, Result};
use crossbeam_channel::Sender;
use serde_json::Value;

/// Handler for messages arriving on a subscribed topic
///
/// # Errors
/// If this returns an error, it will be logged and delivery continues with
/// the next consumer of the topic.
pub trait TopicHandler: Send + 'static {
    fn handle(&mut self, message: &Value) -> Result<()>;
}

impl<F> TopicHandler for F
where
    F: FnMut(&Value) -> Result<()> + Send + 'static,
{
    fn handle(&mut self, message: &Value) -> Result<()> {
        self(message)
    }
}

/// Observer of connection status transitions
pub trait StatusObserver: Send + 'static {
    fn on_status(&mut self, status: ConnectionState);
}

impl<F> StatusObserver for F
where
    F: FnMut(ConnectionState) + Send + 'static,
{
    fn on_status(&mut self, status: ConnectionState) {
        self(status)
    }
}

/// Topic handler that forwards every payload into an unbounded channel
pub struct ChannelForwarder {
    topic: String,
    tx: Sender<Value>,
}

impl ChannelForwarder {
    pub fn new(topic: impl Into<String>, tx: Sender<Value>) -> Self {
        Self {
            topic: topic.into(),
            tx,
        }
    }
}

impl TopicHandler for ChannelForwarder {
    fn handle(&mut self, message: &Value) -> Result<()> {
        self.tx.send(message.clone()).map_err(|_| {
            BridgeError::InvalidState(format!("receiver for {} was dropped", self.topic))
        })
    }
}
