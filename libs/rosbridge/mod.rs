//! # rosbridge
//!
//! Connection manager for a rosbridge-style WebSocket broker: topic
//! subscriptions shared between consumers, fire-and-forget publishing,
//! correlated service calls with deadlines, and a connection state machine
//! with exponential-backoff reconnection.
//!
//! ## Features
//!
//! - **Single owner task**: All state lives in one task fed by one mailbox; no locks on the hot path
//! - **Type-state builder**: Compile-time guarantee that a URL is set
//! - **Shared subscriptions**: One wire subscription per topic, however many consumers
//! - **Exactly-once service calls**: Each call resolves once, with its response, a timeout, or connection loss
//! - **Pluggable transport**: tokio-tungstenite by default, in-memory sockets for tests

pub mod traits;
pub mod core;

// Re-export all traits
pub use traits::*;

// Re-export core client functionality
pub use core::{
    builder, client, codec, config, connection_state,
    builder::{states, BridgeClientBuilder},
    client::{BridgeClient, Metrics, ServiceCall, StatusHandle, SubscriptionHandle},
    codec::{InboundMessage, OutboundMessage},
    config::{ClientConfig, DEFAULT_CALL_TIMEOUT, DEFAULT_URL},
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState},
    ws_transport::TungsteniteTransport,
};

// Convenience function
pub use core::builder as client_builder;
