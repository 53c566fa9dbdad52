use crate::traits::*;
use std::sync::Arc;
use std::time::Duration;

/// Endpoint used when none is configured
pub const DEFAULT_URL: &str = "ws://localhost:9090";

/// Service call timeout used by `BridgeClient::call_service`
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(5000);

/// Configuration for a BridgeClient
///
/// This struct holds everything needed to start a client's state machine
/// task. It is built using the type-state builder.
pub struct ClientConfig {
    /// Broker URL (ws:// or wss://)
    pub(crate) url: String,

    /// Socket factory
    pub(crate) transport: Arc<dyn Transport>,

    /// Reconnection strategy
    pub(crate) reconnect_strategy: Box<dyn ReconnectionStrategy>,

    /// Whether lost or failed connections are retried automatically
    pub(crate) auto_reconnect: bool,

    /// Default deadline for service calls
    pub(crate) call_timeout: Duration,

    /// Re-send one subscribe per live topic after every successful connect
    pub(crate) resubscribe_on_reconnect: bool,
}

impl ClientConfig {
    /// Get a reference to the URL
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn resubscribe_on_reconnect(&self) -> bool {
        self.resubscribe_on_reconnect
    }
}

/// Check that `url` is a WebSocket URL
pub fn validate_endpoint(url: &str) -> Result<()> {
    let rest = url
        .strip_prefix("ws://")
        .or_else(|| url.strip_prefix("wss://"))
        .ok_or_else(|| {
            BridgeError::Configuration(format!(
                "endpoint must start with ws:// or wss://, got '{}'",
                url
            ))
        })?;

    if rest.is_empty() || rest.starts_with('/') {
        return Err(BridgeError::Configuration(format!(
            "endpoint '{}' has no host",
            url
        )));
    }
    Ok(())
}
