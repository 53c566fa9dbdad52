use thiserror::Error;

/// Main error type for the bridge client
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Operation not allowed in the current connection state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Socket closed while the operation was outstanding
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Service call deadline elapsed
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Socket-level open/send failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Inbound frame that is not a valid envelope
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The client task has stopped
    #[error("Bridge client has shut down")]
    Shutdown,
}

impl BridgeError {
    /// Short, stable label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::InvalidState(_) => "invalid_state",
            BridgeError::ConnectionLost(_) => "connection_lost",
            BridgeError::Timeout(_) => "timeout",
            BridgeError::Transport(_) => "transport",
            BridgeError::Protocol(_) => "protocol",
            BridgeError::Configuration(_) => "configuration",
            BridgeError::Shutdown => "shutdown",
        }
    }
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
