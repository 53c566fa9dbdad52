//! Console configuration
//!
//! Loaded from `config/console.yaml` (or `CONSOLE_CONFIG_PATH`). Every
//! section is optional; missing values take the defaults below.
//!
//! ```yaml
//! log_level: info
//! bridge:
//!   url: ws://localhost:9090
//!   auto_reconnect: true
//!   reconnect:
//!     base_delay_ms: 1000
//!     max_delay_ms: 30000
//!     max_attempts: 10
//!   call_timeout_ms: 5000
//!   resubscribe_on_reconnect: false
//! topics:
//!   joint_states: /joint_states
//!   joint_commands: /joint_commands
//!   hardware_status: /hardware_status
//! ```

use rosbridge::builder::states::HasUrl;
use rosbridge::config::validate_endpoint;
use rosbridge::{BridgeClient, BridgeClientBuilder, ExponentialBackoff, DEFAULT_URL};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Environment variable that overrides `bridge.url`
pub const BRIDGE_URL_ENV: &str = "ROS_BRIDGE_URL";

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level console configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub topics: TopicSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default)]
    pub resubscribe_on_reconnect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// `null` retries forever
    #[serde(default = "default_max_attempts")]
    pub max_attempts: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSettings {
    #[serde(default = "default_joint_states")]
    pub joint_states: String,
    #[serde(default = "default_joint_commands")]
    pub joint_commands: String,
    #[serde(default = "default_hardware_status")]
    pub hardware_status: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_call_timeout_ms() -> u64 {
    5000
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> Option<usize> {
    Some(10)
}

fn default_joint_states() -> String {
    "/joint_states".to_string()
}

fn default_joint_commands() -> String {
    "/joint_commands".to_string()
}

fn default_hardware_status() -> String {
    "/hardware_status".to_string()
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            auto_reconnect: true,
            reconnect: ReconnectSettings::default(),
            call_timeout_ms: default_call_timeout_ms(),
            resubscribe_on_reconnect: false,
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            joint_states: default_joint_states(),
            joint_commands: default_joint_commands(),
            hardware_status: default_hardware_status(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            bridge: BridgeSettings::default(),
            topics: TopicSettings::default(),
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from YAML file
    ///
    /// `ROS_BRIDGE_URL` overrides `bridge.url` when set.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config = Self::from_yaml(&yaml_content)?;

        config.apply_url_override(std::env::var(BRIDGE_URL_ENV).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parse without validating or applying overrides
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document means "all defaults"
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn apply_url_override(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|url| !url.trim().is_empty()) {
            info!("Overriding bridge URL from {}", BRIDGE_URL_ENV);
            self.bridge.url = url;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.log_level
            )));
        }

        self.bridge.validate()?;

        for (name, topic) in [
            ("joint_states", &self.topics.joint_states),
            ("joint_commands", &self.topics.joint_commands),
            ("hardware_status", &self.topics.hardware_status),
        ] {
            if !topic.starts_with('/') {
                return Err(ConfigError::ValidationError(format!(
                    "topics.{} must start with '/', got '{}'",
                    name, topic
                )));
            }
        }

        Ok(())
    }

    /// Log configuration
    pub fn log(&self) {
        info!("Configuration:");
        info!("  Bridge URL: {}", self.bridge.url);
        info!("  Auto-reconnect: {}", self.bridge.auto_reconnect);
        info!(
            "  Backoff: {}ms base, {}ms cap, {} attempts",
            self.bridge.reconnect.base_delay_ms,
            self.bridge.reconnect.max_delay_ms,
            self.bridge
                .reconnect
                .max_attempts
                .map_or_else(|| "unlimited".to_string(), |n| n.to_string())
        );
        info!("  Call timeout: {}ms", self.bridge.call_timeout_ms);
        info!("  Log level: {}", self.log_level);
    }
}

impl BridgeSettings {
    fn validate(&self) -> Result<()> {
        validate_endpoint(&self.url)
            .map_err(|e| ConfigError::ValidationError(format!("bridge.url: {}", e)))?;

        let reconnect = &self.reconnect;
        if reconnect.base_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "bridge.reconnect.base_delay_ms must be greater than 0".to_string(),
            ));
        }
        if reconnect.max_delay_ms < reconnect.base_delay_ms {
            return Err(ConfigError::ValidationError(format!(
                "bridge.reconnect.max_delay_ms ({}) must not be below base_delay_ms ({})",
                reconnect.max_delay_ms, reconnect.base_delay_ms
            )));
        }
        if reconnect.max_attempts == Some(0) {
            return Err(ConfigError::ValidationError(
                "bridge.reconnect.max_attempts must be greater than 0; set auto_reconnect: false instead"
                    .to_string(),
            ));
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "bridge.call_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reconnect_strategy(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.reconnect.base_delay_ms),
            Duration::from_millis(self.reconnect.max_delay_ms),
            self.reconnect.max_attempts,
        )
    }

    /// A client builder carrying these settings
    pub fn client_builder(&self) -> BridgeClientBuilder<HasUrl> {
        BridgeClient::builder()
            .url(self.url.clone())
            .auto_reconnect(self.auto_reconnect)
            .reconnect_strategy(self.reconnect_strategy())
            .call_timeout(Duration::from_millis(self.call_timeout_ms))
            .resubscribe_on_reconnect(self.resubscribe_on_reconnect)
    }
}
