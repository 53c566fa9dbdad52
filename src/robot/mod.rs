//! Robot-side types exchanged over the bridge
//!
//! - **kinematics**: Joint limits, forward kinematics, servo angle mapping
//! - **messages**: `sensor_msgs/JointState` and the hardware telemetry report

pub mod kinematics;
pub mod messages;

pub use kinematics::{forward_kinematics, CartesianPose, Joint, JointAngles, JointLimits};
pub use messages::{HardwareStatus, JointState, MessageError, ServoHealth, ServoStatus};
