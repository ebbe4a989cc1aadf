//! Records produced once per fired update for downstream publication.
//!
//! These are plain data; turning them into wire messages is the host's job.

use std::fmt;
use std::sync::Arc;

use autolabor_kinematics::{Pose2D, Twist, VelocityEstimate, WheelTargets};

use crate::joints::{JointRates, WHEEL_JOINT_COUNT};

/// Unit quaternion `(x, y, z, w)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Rotation of `yaw` radians about the z-axis.
    pub fn from_yaw(yaw: f64) -> Self {
        let half = yaw / 2.0;
        Quaternion {
            x: 0.0,
            y: 0.0,
            z: half.sin(),
            w: half.cos(),
        }
    }

    /// Rotation of `angle` radians about the y-axis (a wheel spinning on its axle).
    pub fn from_pitch(angle: f64) -> Self {
        let half = angle / 2.0;
        Quaternion {
            x: 0.0,
            y: half.sin(),
            z: 0.0,
            w: half.cos(),
        }
    }

    /// Yaw angle recovered from a z-axis rotation, in `[-PI, PI]`.
    pub fn yaw(&self) -> f64 {
        (2.0 * (self.w * self.z + self.x * self.y))
            .atan2(1.0 - 2.0 * (self.y * self.y + self.z * self.z))
    }
}

/// Pose and velocity estimate for one update, as an odometry record.
#[derive(Debug, Clone, PartialEq)]
pub struct OdometryRecord {
    pub stamp: f64,
    pub frame_id: Arc<str>,
    pub child_frame_id: Arc<str>,
    pub pose: Pose2D,
    pub orientation: Quaternion,
    pub twist: VelocityEstimate,
}

impl fmt::Display for OdometryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.3}] {} -> {}: pose {} twist {}",
            self.stamp, self.frame_id, self.child_frame_id, self.pose, self.twist
        )
    }
}

/// A rigid transform between two named frames.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTransform {
    pub stamp: f64,
    pub parent: Arc<str>,
    pub child: Arc<str>,
    pub translation: [f64; 3],
    pub rotation: Quaternion,
}

impl FrameTransform {
    /// Planar transform placing `child` at `pose` inside `parent`.
    pub fn planar(stamp: f64, parent: Arc<str>, child: Arc<str>, pose: &Pose2D) -> Self {
        FrameTransform {
            stamp,
            parent,
            child,
            translation: [pose.x, pose.y, 0.0],
            rotation: Quaternion::from_yaw(pose.heading),
        }
    }
}

/// Positions and rates of the four wheel joints.
#[derive(Debug, Clone, PartialEq)]
pub struct JointState {
    pub stamp: f64,
    pub names: [Arc<str>; WHEEL_JOINT_COUNT],
    /// Accumulated joint angles (rad).
    pub positions: [f64; WHEEL_JOINT_COUNT],
    /// Joint rates (rad/s).
    pub velocities: [f64; WHEEL_JOINT_COUNT],
}

/// Everything one fired update produced.
#[derive(Debug, Clone, PartialEq)]
pub struct DriveCycle {
    pub stamp: f64,
    /// Actual time since the previous update (s).
    pub dt: f64,
    /// Command the shaper acted on, after the watchdog.
    pub command: Twist,
    /// The stored command had expired and zero was used instead.
    pub command_stale: bool,
    /// Linear wheel targets (m/s).
    pub targets: WheelTargets,
    /// The same targets as joint rates (rad/s) for the actuation side.
    pub joint_targets: JointRates,
    pub odometry: OdometryRecord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_yaw_quaternion_round_trip() {
        for yaw in [0.0, 0.3, -1.2, PI / 2.0, 3.0] {
            let q = Quaternion::from_yaw(yaw);
            assert!((q.x * q.x + q.y * q.y + q.z * q.z + q.w * q.w - 1.0).abs() < EPSILON);
            assert!((q.yaw() - yaw).abs() < EPSILON);
        }
    }

    #[test]
    fn test_continuous_heading_maps_to_wrapped_yaw() {
        let q = Quaternion::from_yaw(2.0 * PI + 0.5);
        assert!((q.yaw() - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_planar_transform() {
        let tf = FrameTransform::planar(
            1.5,
            Arc::from("odom"),
            Arc::from("base_footprint"),
            &Pose2D::new(1.0, -2.0, PI / 2.0),
        );
        assert_eq!(tf.translation, [1.0, -2.0, 0.0]);
        assert!((tf.rotation.yaw() - PI / 2.0).abs() < EPSILON);
        assert_eq!(&*tf.parent, "odom");
    }
}
