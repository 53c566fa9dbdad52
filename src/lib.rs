//! Robot Arm Console - Main Library
//!
//! Application layer of the robot arm console: configuration, logging and
//! the robot-side message types, on top of the `rosbridge` client.
//!
//! ## Architecture
//!
//! - **rosbridge**: Bridge connection manager (re-exported from workspace)
//! - **config**: YAML configuration for the console binaries
//! - **robot**: Joint/telemetry message types and forward kinematics
//! - **bin_common**: Common utilities for binary executables (CLI, runners)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use arm_console::bin_common::{load_config_from_env, ConfigType};
//! use arm_console::config::ConsoleConfig;
//!
//! let config = ConsoleConfig::load(load_config_from_env(ConfigType::Console))?;
//! let client = config.bridge.client_builder().build()?;
//! ```

// Re-export workspace libraries for convenience
pub use rosbridge;

pub mod config;
pub mod logging;
pub mod robot;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use runner::{interruptible_sleep, BinaryRunner, RunConfig};
}
