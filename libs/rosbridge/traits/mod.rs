//! # Bridge Traits
//!
//! Core traits and types used throughout the bridge client:
//!
//! - **Transport**: Open a full-duplex socket to the broker
//! - **ReconnectionStrategy**: Control reconnection delays and give-up
//! - **TopicHandler**: Consume messages from a subscribed topic
//! - **StatusObserver**: Observe connection status transitions
//!
//! ## Example
//!
//! ```rust,ignore
//! use rosbridge::*;
//!
//! // Log every message on /chatter
//! let handle = client.subscribe("/chatter", "std_msgs/String", |msg: &serde_json::Value| {
//!     tracing::info!("chatter: {}", msg);
//!     Ok(())
//! });
//! ```

pub mod error;
pub mod handler;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use error::{BridgeError, Result};
pub use handler::{ChannelForwarder, StatusObserver, TopicHandler};
pub use reconnect::{ExponentialBackoff, ReconnectDecision, ReconnectPolicy, ReconnectionStrategy};
pub use transport::{Transport, TransportEvent, TransportSocket, WsMessage};
