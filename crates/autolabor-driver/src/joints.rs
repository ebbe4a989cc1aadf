//! The four wheel joints: naming, measured rates, and accumulated angles.

use autolabor_kinematics::{DifferentialDrive, WheelPair, WheelTargets};

pub const WHEEL_JOINT_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelJoint {
    FrontLeft,
    RearLeft,
    FrontRight,
    RearRight,
}

impl WheelJoint {
    /// Every joint, in the order used by the array views below.
    pub const ALL: [WheelJoint; WHEEL_JOINT_COUNT] = [
        WheelJoint::FrontLeft,
        WheelJoint::RearLeft,
        WheelJoint::FrontRight,
        WheelJoint::RearRight,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WheelJoint::FrontLeft => "front_left_wheel",
            WheelJoint::RearLeft => "rear_left_wheel",
            WheelJoint::FrontRight => "front_right_wheel",
            WheelJoint::RearRight => "rear_right_wheel",
        }
    }

    pub fn is_left(self) -> bool {
        matches!(self, WheelJoint::FrontLeft | WheelJoint::RearLeft)
    }

    /// Axle centre of this wheel in the base frame `(x forward, y left)`.
    pub fn mount_offset(self, wheelbase: f64, wheel_separation: f64) -> (f64, f64) {
        let x = match self {
            WheelJoint::FrontLeft | WheelJoint::FrontRight => wheelbase / 2.0,
            WheelJoint::RearLeft | WheelJoint::RearRight => -wheelbase / 2.0,
        };
        let y = if self.is_left() {
            wheel_separation / 2.0
        } else {
            -wheel_separation / 2.0
        };
        (x, y)
    }
}

/// Angular rates (rad/s) of the four wheel joints.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointRates {
    pub front_left: f64,
    pub rear_left: f64,
    pub front_right: f64,
    pub rear_right: f64,
}

impl JointRates {
    pub const fn new(front_left: f64, rear_left: f64, front_right: f64, rear_right: f64) -> Self {
        JointRates {
            front_left,
            rear_left,
            front_right,
            rear_right,
        }
    }

    /// Both left joints at `left`, both right joints at `right`.
    pub const fn sides(left: f64, right: f64) -> Self {
        JointRates::new(left, left, right, right)
    }

    /// Joint rates that realise the given linear wheel targets.
    pub fn from_targets(targets: &WheelTargets, drive: &DifferentialDrive) -> Self {
        JointRates::sides(
            drive.speed_to_rate(targets.left_target),
            drive.speed_to_rate(targets.right_target),
        )
    }

    pub fn to_array(&self) -> [f64; WHEEL_JOINT_COUNT] {
        [self.front_left, self.rear_left, self.front_right, self.rear_right]
    }

    /// Linear speed of each side: the mean of its two joints times the wheel radius.
    ///
    /// A non-finite joint makes its side non-finite; the integrator then falls
    /// back to the last good sample.
    pub fn to_wheel_pair(&self, drive: &DifferentialDrive) -> WheelPair {
        WheelPair::from_angular(
            (self.front_left + self.rear_left) / 2.0,
            (self.front_right + self.rear_right) / 2.0,
            drive.wheel_radius(),
        )
    }
}

/// Accumulated wheel joint angles.
#[derive(Debug, Clone, Default)]
pub struct WheelJoints {
    positions: [f64; WHEEL_JOINT_COUNT],
    rates: [f64; WHEEL_JOINT_COUNT],
}

impl WheelJoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance every joint by `rate * dt`. Non-finite rates reuse that joint's last good rate.
    ///
    /// Returns the number of substituted samples.
    pub fn advance(&mut self, measured: &JointRates, dt: f64) -> usize {
        let mut substituted = 0;
        for (i, rate) in measured.to_array().into_iter().enumerate() {
            if rate.is_finite() {
                self.rates[i] = rate;
            } else {
                substituted += 1;
            }
            self.positions[i] += self.rates[i] * dt;
        }
        substituted
    }

    pub fn positions(&self) -> [f64; WHEEL_JOINT_COUNT] {
        self.positions
    }

    pub fn rates(&self) -> [f64; WHEEL_JOINT_COUNT] {
        self.rates
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-9;

    fn drive() -> DifferentialDrive {
        DifferentialDrive::new(0.5, 0.2).unwrap()
    }

    #[test]
    fn test_sides_average_their_joints() {
        let rates = JointRates::new(9.0, 11.0, -4.0, -6.0);
        let pair = rates.to_wheel_pair(&drive());
        assert!((pair.left_speed - 1.0).abs() < EPSILON);
        assert!((pair.right_speed + 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_targets_to_joint_rates() {
        let rates = JointRates::from_targets(&WheelTargets::new(0.5, -1.0), &drive());
        assert_eq!(rates, JointRates::sides(5.0, -10.0));
        assert_eq!(rates.rear_right, -10.0);
    }

    #[test]
    fn test_joint_angles_accumulate() {
        let mut joints = WheelJoints::new();
        joints.advance(&JointRates::new(1.0, 2.0, -1.0, 0.0), 0.5);
        joints.advance(&JointRates::new(1.0, 2.0, -1.0, 0.0), 0.5);
        assert_eq!(joints.positions(), [1.0, 2.0, -1.0, 0.0]);
    }

    #[test]
    fn test_bad_joint_rate_reuses_last_good_one() {
        let mut joints = WheelJoints::new();
        joints.advance(&JointRates::sides(2.0, 2.0), 1.0);
        let substituted = joints.advance(&JointRates::new(f64::NAN, 2.0, 2.0, 2.0), 1.0);
        assert_eq!(substituted, 1);
        assert_eq!(joints.positions(), [4.0; 4]);
        assert_eq!(joints.rates(), [2.0; 4]);
    }

    #[test]
    fn test_mount_offsets() {
        assert_eq!(WheelJoint::FrontLeft.mount_offset(0.4, 0.5), (0.2, 0.25));
        assert_eq!(WheelJoint::RearRight.mount_offset(0.4, 0.5), (-0.2, -0.25));
    }
}
