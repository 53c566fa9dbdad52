//! Joint Jog Binary
//!
//! Sends one joint command to the arm and prints the resulting pose.
//!
//! Usage:
//!   ./joint-jog                      # Home position (all joints at 0°)
//!   ./joint-jog 30 -15 45 0 10 0     # Six joint angles in degrees

use anyhow::{bail, Context, Result};
use arm_console::bin_common::{
    interruptible_sleep, load_config_from_env, parse_args, BinaryRunner, ConfigType, RunConfig,
};
use arm_console::config::ConsoleConfig;
use arm_console::logging::init_tracing;
use arm_console::robot::messages::JOINT_STATE_TYPE;
use arm_console::robot::{forward_kinematics, JointAngles, JointState};
use rosbridge::ConnectionState;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

struct JointJog {
    run_config: RunConfig,
    config: ConsoleConfig,
    target: JointAngles,
}

/// Parse zero or six angles (degrees)
fn parse_angles(args: &[String]) -> Result<JointAngles> {
    if args.is_empty() {
        return Ok(JointAngles::default());
    }
    if args.len() != 6 {
        bail!("Expected 6 joint angles in degrees, got {}", args.len());
    }

    let mut angles = [0.0; 6];
    for (slot, arg) in angles.iter_mut().zip(args) {
        *slot = arg
            .parse::<f64>()
            .with_context(|| format!("Invalid joint angle '{}'", arg))?;
    }
    Ok(JointAngles::from_array(angles))
}

impl BinaryRunner for JointJog {
    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    async fn run(&mut self) -> Result<()> {
        for joint in self.target.out_of_limits() {
            let limits = joint.limits();
            warn!(
                "[Jog] {} = {:.1}° outside [{:.0}°, {:.0}°], clamping",
                joint,
                self.target.get(joint),
                limits.min,
                limits.max
            );
        }
        let target = self.target.clamped();
        let command = JointState::command(&target).to_value()?;

        let client = self
            .config
            .bridge
            .client_builder()
            .build()
            .context("Failed to create bridge client")?;

        let (status_tx, mut status_rx) = mpsc::unbounded_channel();
        let status_handle = client.observe_status(move |status: ConnectionState| {
            let _ = status_tx.send(status);
        });
        client.connect();

        let connect_timeout = Duration::from_secs(self.run_config.connect_timeout_secs.unwrap_or(10));
        let connected = tokio::time::timeout(connect_timeout, async {
            while let Some(status) = status_rx.recv().await {
                info!("[Jog] Bridge {}", status);
                if status == ConnectionState::Connected {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);

        if !connected {
            status_handle.unobserve();
            client.shutdown().await;
            bail!(
                "Bridge at {} not reachable within {:?}",
                client.endpoint(),
                connect_timeout
            );
        }

        client.publish(self.config.topics.joint_commands.as_str(), JOINT_STATE_TYPE, command);
        info!(
            "[Jog] Commanded {:?} -> {}",
            target.to_array(),
            forward_kinematics(&target)
        );

        // Let the writer flush the frame before closing
        if interruptible_sleep(Duration::from_millis(200)).await {
            info!("[Jog] Interrupted, closing now");
        }
        status_handle.unobserve();
        client.disconnect();
        client.shutdown().await;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let target = parse_angles(&parse_args())?;

    // Load config
    let config_path = load_config_from_env(ConfigType::Console);
    let config = ConsoleConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    // Initialize logging
    init_tracing(&config.log_level);

    let mut jog = JointJog {
        run_config: RunConfig::new("Joint Jog").with_connect_timeout(10),
        config,
        target,
    };
    jog.execute().await
}
