//! Messages exchanged with the arm controller
//!
//! - `/joint_states`, `/joint_commands`: `sensor_msgs/JointState`, positions in radians
//! - `/hardware_status`: JSON telemetry, either bare or wrapped in a
//!   `std_msgs/String` (`{"data": "<json>"}`)

use crate::robot::kinematics::{Joint, JointAngles};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const JOINT_STATE_TYPE: &str = "sensor_msgs/JointState";
pub const HARDWARE_STATUS_TYPE: &str = "std_msgs/String";

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Invalid message JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown joint name: {0}")]
    UnknownJoint(String),

    #[error("Expected {expected} joint positions, got {got}")]
    Incomplete { expected: usize, got: usize },
}

/// `sensor_msgs/JointState`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JointState {
    #[serde(default)]
    pub name: Vec<String>,
    #[serde(default)]
    pub position: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub velocity: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effort: Vec<f64>,
}

impl JointState {
    /// Command moving every joint to `angles` (degrees)
    pub fn command(angles: &JointAngles) -> Self {
        Self {
            name: Joint::ALL.iter().map(|joint| joint.name().to_string()).collect(),
            position: angles.to_array().iter().map(|deg| deg.to_radians()).collect(),
            velocity: Vec::new(),
            effort: Vec::new(),
        }
    }

    pub fn from_value(value: &Value) -> Result<Self, MessageError> {
        Ok(Self::deserialize(value)?)
    }

    pub fn to_value(&self) -> Result<Value, MessageError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Joint angles in degrees
    ///
    /// Positions are matched by name when names are present, otherwise by
    /// order. Every joint must be covered.
    pub fn to_angles(&self) -> Result<JointAngles, MessageError> {
        let mut degrees: [Option<f64>; 6] = [None; 6];

        if self.name.is_empty() {
            for (slot, position) in degrees.iter_mut().zip(&self.position) {
                *slot = Some(position.to_degrees());
            }
        } else {
            for (name, position) in self.name.iter().zip(&self.position) {
                let joint =
                    Joint::from_name(name).ok_or_else(|| MessageError::UnknownJoint(name.clone()))?;
                degrees[joint.index()] = Some(position.to_degrees());
            }
        }

        let got = degrees.iter().filter(|d| d.is_some()).count();
        if got < degrees.len() {
            return Err(MessageError::Incomplete {
                expected: degrees.len(),
                got,
            });
        }
        Ok(JointAngles::from_array(degrees.map(|d| d.unwrap_or_default())))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Esp32Status {
    pub connected: bool,
    pub uptime: u64,
    pub free_memory: u64,
    pub wifi_signal: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RaspberryPiStatus {
    pub connected: bool,
    pub cpu_usage: f64,
    pub temperature: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pca9685Status {
    pub connected: bool,
    pub i2c_address: String,
    pub frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerSupplyStatus {
    #[serde(rename = "voltage5v")]
    pub voltage_5v: f64,
    #[serde(rename = "current5v")]
    pub current_5v: f64,
    #[serde(rename = "voltage20v")]
    pub voltage_20v: f64,
    #[serde(rename = "current20v")]
    pub current_20v: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServoHealth {
    #[default]
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoStatus {
    pub id: u8,
    pub joint: String,
    pub angle: f64,
    /// Percent of rated load
    pub load: f64,
    /// Celsius
    pub temperature: f64,
    pub voltage: f64,
    pub status: ServoHealth,
}

/// Telemetry report published on `/hardware_status`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HardwareStatus {
    pub esp32: Esp32Status,
    pub raspberry_pi: RaspberryPiStatus,
    pub pca9685: Pca9685Status,
    pub power_supply: PowerSupplyStatus,
    pub servos: Vec<ServoStatus>,
}

impl HardwareStatus {
    /// Decode a topic payload, unwrapping a `std_msgs/String` if present
    pub fn from_message(msg: &Value) -> Result<Self, MessageError> {
        match msg.get("data").and_then(Value::as_str) {
            Some(inner) => Ok(serde_json::from_str(inner)?),
            None => Ok(Self::deserialize(msg)?),
        }
    }

    /// Servos reporting a warning or an error
    pub fn faulted_servos(&self) -> impl Iterator<Item = &ServoStatus> {
        self.servos
            .iter()
            .filter(|servo| servo.status != ServoHealth::Ok)
    }

    pub fn all_controllers_connected(&self) -> bool {
        self.esp32.connected && self.raspberry_pi.connected && self.pca9685.connected
    }
}
