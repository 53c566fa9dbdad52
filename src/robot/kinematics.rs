//! Kinematics for the 6-axis arm
//!
//! All joint angles are in degrees. Poses are in millimetres (position)
//! and radians (orientation).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Link lengths in mm, base to tool
pub const LINK_LENGTHS_MM: [f64; 6] = [0.0, 105.0, 105.0, 130.0, 0.0, 50.0];

/// Full travel of an MG996R servo in degrees
pub const SERVO_RANGE_DEG: f64 = 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Joint {
    /// Base rotation
    Joint1,
    /// Shoulder
    Joint2,
    /// Elbow
    Joint3,
    /// Wrist pitch
    Joint4,
    /// Wrist roll
    Joint5,
    /// End effector
    Joint6,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimits {
    pub min: f64,
    pub max: f64,
}

impl JointLimits {
    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    pub fn contains(&self, angle: f64) -> bool {
        angle >= self.min && angle <= self.max
    }

    pub fn clamp(&self, angle: f64) -> f64 {
        angle.max(self.min).min(self.max)
    }
}

impl Joint {
    pub const ALL: [Joint; 6] = [
        Joint::Joint1,
        Joint::Joint2,
        Joint::Joint3,
        Joint::Joint4,
        Joint::Joint5,
        Joint::Joint6,
    ];

    /// Name used on the wire (`joint1` .. `joint6`)
    pub fn name(&self) -> &'static str {
        match self {
            Joint::Joint1 => "joint1",
            Joint::Joint2 => "joint2",
            Joint::Joint3 => "joint3",
            Joint::Joint4 => "joint4",
            Joint::Joint5 => "joint5",
            Joint::Joint6 => "joint6",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|joint| joint.name() == name)
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn limits(&self) -> JointLimits {
        let (min, max) = match self {
            Joint::Joint1 | Joint::Joint5 | Joint::Joint6 => (-170.0, 170.0),
            Joint::Joint2 | Joint::Joint3 | Joint::Joint4 => (-90.0, 90.0),
        };
        JointLimits { min, max }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Joint angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointAngles {
    pub joint1: f64,
    pub joint2: f64,
    pub joint3: f64,
    pub joint4: f64,
    pub joint5: f64,
    pub joint6: f64,
}

impl JointAngles {
    pub fn from_array(angles: [f64; 6]) -> Self {
        let [joint1, joint2, joint3, joint4, joint5, joint6] = angles;
        Self {
            joint1,
            joint2,
            joint3,
            joint4,
            joint5,
            joint6,
        }
    }

    pub fn to_array(&self) -> [f64; 6] {
        [
            self.joint1,
            self.joint2,
            self.joint3,
            self.joint4,
            self.joint5,
            self.joint6,
        ]
    }

    pub fn get(&self, joint: Joint) -> f64 {
        self.to_array()[joint.index()]
    }

    pub fn set(&mut self, joint: Joint, angle: f64) {
        let mut angles = self.to_array();
        angles[joint.index()] = angle;
        *self = Self::from_array(angles);
    }

    /// Every angle clamped to its joint's limits
    pub fn clamped(&self) -> Self {
        let mut clamped = *self;
        for joint in Joint::ALL {
            clamped.set(joint, clamp_joint_angle(joint, self.get(joint)));
        }
        clamped
    }

    /// Joints whose angle is outside its limits
    pub fn out_of_limits(&self) -> Vec<Joint> {
        Joint::ALL
            .into_iter()
            .filter(|joint| !joint.limits().contains(self.get(*joint)))
            .collect()
    }

    pub fn is_within_limits(&self) -> bool {
        self.out_of_limits().is_empty()
    }
}

/// End effector pose
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CartesianPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl fmt::Display for CartesianPose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x={:.1}mm y={:.1}mm z={:.1}mm roll={:.1}° pitch={:.1}° yaw={:.1}°",
            self.x,
            self.y,
            self.z,
            self.roll.to_degrees(),
            self.pitch.to_degrees(),
            self.yaw.to_degrees()
        )
    }
}

pub fn clamp_joint_angle(joint: Joint, angle: f64) -> f64 {
    joint.limits().clamp(angle)
}

/// Forward kinematics: end effector pose for the given joint angles
///
/// Angles outside a joint's limits are clamped first. The arm is treated
/// as a planar shoulder/elbow/wrist chain rotated by the base joint.
pub fn forward_kinematics(angles: &JointAngles) -> CartesianPose {
    let angles = angles.clamped();
    let [_, l1, l2, l3, l4, _] = LINK_LENGTHS_MM;

    let r1 = angles.joint1.to_radians();
    let r2 = angles.joint2.to_radians();
    let r3 = angles.joint3.to_radians();
    let r4 = angles.joint4.to_radians();
    let r5 = angles.joint5.to_radians();

    let reach = l2 * r2.cos() + l3 * (r2 + r3).cos() + l4 * (r2 + r3 + r4).cos();
    let height = l1 + l2 * r2.sin() + l3 * (r2 + r3).sin() + l4 * (r2 + r3 + r4).sin();

    CartesianPose {
        x: r1.cos() * reach,
        y: r1.sin() * reach,
        z: height,
        roll: r5,
        pitch: r2 + r3 + r4,
        yaw: r1,
    }
}

/// Joint angle for a servo position (0..=180°)
pub fn servo_to_joint_angle(servo_angle: f64, joint: Joint) -> f64 {
    let limits = joint.limits();
    let servo_angle = servo_angle.clamp(0.0, SERVO_RANGE_DEG);
    limits.min + (servo_angle / SERVO_RANGE_DEG) * limits.range()
}

/// Servo position (0..=180°) for a joint angle
pub fn joint_to_servo_angle(joint_angle: f64, joint: Joint) -> f64 {
    let limits = joint.limits();
    ((clamp_joint_angle(joint, joint_angle) - limits.min) / limits.range()) * SERVO_RANGE_DEG
}
