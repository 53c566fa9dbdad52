//! Envelope codec for the bridge wire protocol
//!
//! Outbound frames are JSON objects tagged by `op`. Inbound frames are
//! routed by shape: anything carrying a `topic` is a topic message,
//! anything carrying a string `id` is a service response. An `op` field on
//! inbound frames (rosbridge sends `publish` / `service_response`) is
//! accepted and ignored.

use crate::error::{BridgeError, Result};
use crate::traits::WsMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames the client sends to the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OutboundMessage {
    Subscribe {
        topic: String,
        #[serde(rename = "type")]
        message_type: String,
    },
    Unsubscribe {
        topic: String,
    },
    Publish {
        topic: String,
        #[serde(rename = "type")]
        message_type: String,
        msg: Value,
    },
    CallService {
        service: String,
        #[serde(rename = "type")]
        service_type: String,
        args: Value,
        id: String,
    },
}

impl OutboundMessage {
    pub fn op(&self) -> &'static str {
        match self {
            OutboundMessage::Subscribe { .. } => "subscribe",
            OutboundMessage::Unsubscribe { .. } => "unsubscribe",
            OutboundMessage::Publish { .. } => "publish",
            OutboundMessage::CallService { .. } => "call_service",
        }
    }

    /// Encode as a text frame
    pub fn encode(&self) -> Result<WsMessage> {
        serde_json::to_string(self)
            .map(WsMessage::Text)
            .map_err(|e| BridgeError::Protocol(format!("failed to encode {}: {}", self.op(), e)))
    }

    /// Decode an outbound frame (used by broker-side test doubles)
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| BridgeError::Protocol(e.to_string()))
    }
}

/// Frames the broker sends to the client
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Topic { topic: String, msg: Value },
    ServiceResponse { id: String, values: Value },
}

#[derive(Deserialize)]
struct RawInbound {
    topic: Option<String>,
    #[serde(default)]
    msg: Value,
    id: Option<Value>,
    #[serde(default)]
    values: Value,
}

impl InboundMessage {
    /// Decode an inbound frame
    ///
    /// # Errors
    /// `BridgeError::Protocol` for binary frames, invalid JSON, non-object
    /// JSON, and objects with neither `topic` nor a string `id`.
    pub fn decode(frame: &WsMessage) -> Result<Self> {
        let text = frame
            .as_text()
            .ok_or_else(|| BridgeError::Protocol("binary frame".to_string()))?;

        let value: Value =
            serde_json::from_str(text).map_err(|e| BridgeError::Protocol(e.to_string()))?;
        if !value.is_object() {
            return Err(BridgeError::Protocol(format!(
                "expected a JSON object, got {}",
                json_kind(&value)
            )));
        }

        let raw: RawInbound =
            serde_json::from_value(value).map_err(|e| BridgeError::Protocol(e.to_string()))?;

        match raw {
            RawInbound {
                topic: Some(topic), msg, ..
            } if !topic.is_empty() => Ok(InboundMessage::Topic { topic, msg }),
            RawInbound {
                id: Some(Value::String(id)),
                values,
                ..
            } => Ok(InboundMessage::ServiceResponse { id, values }),
            _ => Err(BridgeError::Protocol(
                "frame has neither a topic nor a call id".to_string(),
            )),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
