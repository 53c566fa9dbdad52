pub mod states;

use crate::core::client::BridgeClient;
use crate::core::config::{validate_endpoint, ClientConfig, DEFAULT_CALL_TIMEOUT};
use crate::core::ws_transport::TungsteniteTransport;
use crate::traits::*;
use states::*;
use std::sync::Arc;
use std::time::Duration;

/// Type-state builder for BridgeClient
///
/// This builder uses Rust's type system to enforce that the broker URL
/// is set before the client can be built. Everything else has a default:
///
/// - transport: [`TungsteniteTransport`]
/// - reconnect strategy: `ExponentialBackoff::default()` (1s base, 30s cap, 10 attempts)
/// - auto-reconnect: off
/// - call timeout: 5s
/// - resubscribe on reconnect: off
pub struct BridgeClientBuilder<U>
where
    U: UrlState,
{
    _state: TypeState<U>,
    url: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    auto_reconnect: bool,
    call_timeout: Duration,
    resubscribe_on_reconnect: bool,
}

impl BridgeClientBuilder<NoUrl> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            url: None,
            transport: None,
            reconnect_strategy: None,
            auto_reconnect: false,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            resubscribe_on_reconnect: false,
        }
    }

    pub fn url(self, url: impl Into<String>) -> BridgeClientBuilder<HasUrl> {
        BridgeClientBuilder {
            _state: TypeState::new(),
            url: Some(url.into()),
            transport: self.transport,
            reconnect_strategy: self.reconnect_strategy,
            auto_reconnect: self.auto_reconnect,
            call_timeout: self.call_timeout,
            resubscribe_on_reconnect: self.resubscribe_on_reconnect,
        }
    }
}

impl Default for BridgeClientBuilder<NoUrl> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> BridgeClientBuilder<U>
where
    U: UrlState,
{
    /// Replace the socket factory (tests use an in-memory one)
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Box::new(strategy));
        self
    }

    /// Retry lost or failed connections with the reconnect strategy
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Default deadline for `call_service`
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Re-send one `subscribe` per live topic after every successful connect
    ///
    /// Off by default: a consumer registered before a reconnect then only
    /// receives messages again once its topic is subscribed anew.
    pub fn resubscribe_on_reconnect(mut self, enabled: bool) -> Self {
        self.resubscribe_on_reconnect = enabled;
        self
    }
}

impl BridgeClientBuilder<HasUrl> {
    /// Validate the configuration and start the client task
    ///
    /// The client starts disconnected; call `connect()` to open the socket.
    ///
    /// # Errors
    /// * `Configuration` - Invalid URL, or not called within a tokio runtime
    pub fn build(self) -> Result<BridgeClient> {
        let url = self
            .url
            .ok_or_else(|| BridgeError::Configuration("URL must be set".to_string()))?;
        validate_endpoint(&url)?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            BridgeError::Configuration("BridgeClient must be built inside a tokio runtime".to_string())
        })?;

        let config = ClientConfig {
            url,
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(TungsteniteTransport)),
            reconnect_strategy: self
                .reconnect_strategy
                .unwrap_or_else(|| Box::new(ExponentialBackoff::default())),
            auto_reconnect: self.auto_reconnect,
            call_timeout: self.call_timeout,
            resubscribe_on_reconnect: self.resubscribe_on_reconnect,
        };

        Ok(BridgeClient::spawn(config, &runtime))
    }
}
