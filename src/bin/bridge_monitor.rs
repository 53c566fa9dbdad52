//! Bridge Monitor Binary
//!
//! Connects to the arm's bridge server and watches it until Ctrl+C:
//! connection status, joint states (logged as the end effector pose) and
//! hardware telemetry (servo faults are warned about).
//!
//! Usage:
//!   ./bridge-monitor
//!   ROS_BRIDGE_URL=ws://192.168.1.20:9090 ./bridge-monitor

use anyhow::{Context, Result};
use arm_console::bin_common::{load_config_from_env, BinaryRunner, ConfigType, RunConfig};
use arm_console::config::ConsoleConfig;
use arm_console::logging::init_tracing;
use arm_console::robot::messages::{HARDWARE_STATUS_TYPE, JOINT_STATE_TYPE};
use arm_console::robot::{forward_kinematics, HardwareStatus, JointState};
use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use rosbridge::{BridgeClient, BridgeError, ConnectionState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

struct BridgeMonitor {
    run_config: RunConfig,
    config: ConsoleConfig,
    summary: Option<String>,
}

impl BridgeMonitor {
    fn new(config: ConsoleConfig) -> Self {
        Self {
            run_config: RunConfig::new("Bridge Monitor").with_heartbeat(30),
            config,
            summary: None,
        }
    }
}

/// Drain telemetry on a dedicated thread, keeping the latest report
fn spawn_telemetry_thread(
    rx: Receiver<Value>,
    latest: Arc<RwLock<Option<HardwareStatus>>>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("hardware-telemetry".to_string())
        .spawn(move || {
            for msg in rx.iter() {
                let status = match HardwareStatus::from_message(&msg) {
                    Ok(status) => status,
                    Err(e) => {
                        warn!("[Telemetry] Ignoring hardware status: {}", e);
                        continue;
                    }
                };

                for servo in status.faulted_servos() {
                    warn!(
                        "[Telemetry] Servo {} ({}) {:?}: {:.0}% load, {:.1}°C, {:.2}V",
                        servo.id, servo.joint, servo.status, servo.load, servo.temperature, servo.voltage
                    );
                }
                if !status.all_controllers_connected() {
                    warn!(
                        "[Telemetry] Controller offline: esp32={} raspberryPi={} pca9685={}",
                        status.esp32.connected, status.raspberry_pi.connected, status.pca9685.connected
                    );
                }
                *latest.write() = Some(status);
            }
            debug!("[Telemetry] Channel closed, thread exiting");
        })
}

fn log_pose(msg: &Value) -> rosbridge::Result<()> {
    let angles = JointState::from_value(msg)
        .and_then(|state| state.to_angles())
        .map_err(|e| BridgeError::Protocol(e.to_string()))?;
    info!("[Joints] {}", forward_kinematics(&angles));
    Ok(())
}

/// Log the broker's topic list once
async fn list_topics(client: BridgeClient) {
    match client
        .call_service("/rosapi/topics", "rosapi/Topics", json!({}))
        .await
    {
        Ok(values) => {
            let topics: Vec<&str> = values["topics"]
                .as_array()
                .map(|topics| topics.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            info!("[Monitor] Bridge advertises {} topics: {}", topics.len(), topics.join(", "));
        }
        Err(e) => warn!("[Monitor] Topic listing failed: {}", e),
    }
}

impl BinaryRunner for BridgeMonitor {
    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn stats(&self) -> Option<String> {
        self.summary.clone()
    }

    async fn run(&mut self) -> Result<()> {
        let topics = self.config.topics.clone();
        // Consumers are registered before the socket opens; their wire
        // subscriptions must go out on every Connected
        let client = self
            .config
            .bridge
            .client_builder()
            .resubscribe_on_reconnect(true)
            .build()
            .context("Failed to create bridge client")?;

        let (status_tx, mut status_rx) = mpsc::unbounded_channel();
        let status_handle = client.observe_status(move |status: ConnectionState| {
            let _ = status_tx.send(status);
        });

        let latest_telemetry = Arc::new(RwLock::new(None));
        let (telemetry_handle, telemetry_rx) =
            client.subscribe_channel(topics.hardware_status.as_str(), HARDWARE_STATUS_TYPE);
        let telemetry_thread = spawn_telemetry_thread(telemetry_rx, Arc::clone(&latest_telemetry))
            .context("Failed to spawn telemetry thread")?;
        let joints_handle = client.subscribe(topics.joint_states.as_str(), JOINT_STATE_TYPE, log_pose);

        client.connect();

        let mut heartbeat =
            tokio::time::interval(Duration::from_secs(self.run_config.heartbeat_interval_secs));
        let mut listed_topics = false;

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("[Monitor] Failed to listen for Ctrl+C: {}", e);
                    }
                    info!("[Monitor] Shutdown requested");
                    break;
                }
                Some(status) = status_rx.recv() => {
                    info!("[Monitor] Bridge {} ({})", status, client.endpoint());
                    if status == ConnectionState::Connected && !listed_topics {
                        listed_topics = true;
                        tokio::spawn(list_topics(client.clone()));
                    }
                }
                _ = heartbeat.tick() => {
                    let metrics = client.metrics();
                    info!(
                        "[Monitor] {} | sent={} received={} discarded={} reconnects={} timeouts={}",
                        metrics.connection_state,
                        metrics.messages_sent,
                        metrics.messages_received,
                        metrics.frames_discarded,
                        metrics.reconnect_count,
                        metrics.calls_timed_out
                    );
                    if let Some(status) = latest_telemetry.read().as_ref() {
                        info!(
                            "[Monitor] Pi CPU {:.0}% {:.1}°C | 20V rail {:.1}V {:.1}A | {} servos",
                            status.raspberry_pi.cpu_usage,
                            status.raspberry_pi.temperature,
                            status.power_supply.voltage_20v,
                            status.power_supply.current_20v,
                            status.servos.len()
                        );
                    }
                }
            }
        }

        status_handle.unobserve();
        joints_handle.unsubscribe();
        telemetry_handle.unsubscribe();
        client.disconnect();

        let metrics = client.metrics();
        client.shutdown().await;

        // The forwarder's sender is gone once the client task has exited
        if telemetry_thread.join().is_err() {
            error!("[Monitor] Telemetry thread panicked");
        }

        self.summary = Some(format!(
            "Messages: {} sent, {} received, {} discarded | Reconnects: {}",
            metrics.messages_sent,
            metrics.messages_received,
            metrics.frames_discarded,
            metrics.reconnect_count
        ));
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Load config
    let config_path = load_config_from_env(ConfigType::Console);
    let config = ConsoleConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    // Initialize logging
    init_tracing(&config.log_level);
    config.log();

    BridgeMonitor::new(config).execute().await
}
