//! # Bridge client core
//!
//! The client is split into a thin, cloneable façade ([`BridgeClient`]) and
//! a state machine task that owns all mutable state. The façade only sends
//! commands; the task serialises them with socket events and timers.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rosbridge::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = BridgeClient::builder()
//!         .url("ws://localhost:9090")
//!         .auto_reconnect(true)
//!         .reconnect_strategy(ExponentialBackoff::new(
//!             Duration::from_millis(1000),
//!             Duration::from_millis(30_000),
//!             Some(10),
//!         ))
//!         .build()?;
//!
//!     let _status = client.observe_status(|s: ConnectionState| println!("bridge {}", s));
//!     client.connect();
//!
//!     let topics = client
//!         .call_service("/rosapi/topics", "rosapi/Topics", serde_json::json!({}))
//!         .await?;
//!     println!("topics: {}", topics);
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection_state;
pub mod correlator;
pub(crate) mod machine;
pub mod registry;
pub mod scheduler;
pub mod status;
pub mod ws_transport;

// Re-export main types
pub use builder::{states, BridgeClientBuilder};
pub use client::{BridgeClient, Metrics, ServiceCall, StatusHandle, SubscriptionHandle};
pub use codec::{InboundMessage, OutboundMessage};
pub use config::{ClientConfig, DEFAULT_CALL_TIMEOUT, DEFAULT_URL};
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
pub use ws_transport::TungsteniteTransport;

/// Create a new bridge client builder
///
/// This is a convenience function for starting the builder pattern.
///
/// # Example
/// ```ignore
/// let client = rosbridge::builder()
///     .url("ws://localhost:9090")
///     .auto_reconnect(true)
///     .build()?;
/// client.connect();
/// ```
pub fn builder() -> BridgeClientBuilder<states::NoUrl> {
    BridgeClientBuilder::new()
}
