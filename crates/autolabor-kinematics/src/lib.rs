#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![doc = "A `no_std` dead-reckoning and command-shaping core for four-wheel differential-drive robots."]
#![doc = ""]
#![doc = "This crate provides wheel/body velocity conversions, an acceleration-limited"]
#![doc = "command shaper, a forward-Euler odometry integrator, and a fixed-period update scheduler."]
#![doc = "Nothing here knows about threads or locks; the driver crate wraps it."]

use core::f64::consts::PI;
use core::fmt;
use libm::{cos, sin};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod error;
pub mod odometry;
pub mod scheduler;
pub mod shaper;

pub use error::KinematicsError;
pub use odometry::{OdomSource, OdometryIntegrator, OdometryUpdate};
pub use scheduler::{Tick, UpdateScheduler};
pub use shaper::{CommandShaper, CommandState};

/// A 2‑D pose `(x, y, heading)` in meters and radians, expressed in the odometry frame.
///
/// The heading accumulates continuously; it is not wrapped into `[-PI, PI)`.
/// Use [`Pose2D::normalize_angle`] when a bounded yaw is needed.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose2D {
    /// Odometry‑frame x position (m).
    pub x: f64,
    /// Odometry‑frame y position (m).
    pub y: f64,
    /// Heading (rad), counter‑clockwise from the x‑axis.
    pub heading: f64,
}

impl Pose2D {
    /// Construct a new pose.
    ///
    /// # Arguments
    ///
    /// * `x`: Odometry-frame x position in meters.
    /// * `y`: Odometry-frame y position in meters.
    /// * `heading`: Heading in radians.
    pub const fn new(x: f64, y: f64, heading: f64) -> Self {
        Pose2D { x, y, heading }
    }

    /// Returns `true` when every component is finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.heading.is_finite()
    }

    /// Apply `other`, expressed in this pose's frame, on top of this pose.
    pub fn compose(&self, other: &Pose2D) -> Pose2D {
        let (s, c) = (sin(self.heading), cos(self.heading));
        Pose2D::new(
            self.x + c * other.x - s * other.y,
            self.y + s * other.x + c * other.y,
            self.heading + other.heading,
        )
    }

    /// The pose that undoes this one, so that `p.compose(&p.inverse())` is the identity.
    pub fn inverse(&self) -> Pose2D {
        let (s, c) = (sin(self.heading), cos(self.heading));
        Pose2D::new(
            -c * self.x - s * self.y,
            s * self.x - c * self.y,
            -self.heading,
        )
    }

    /// Normalize an angle to be within `[-PI, PI)`.
    ///
    /// Angles at `PI` will be normalized to `-PI`.
    pub fn normalize_angle(angle: f64) -> f64 {
        let a = angle % (2.0 * PI);
        if a >= PI {
            a - 2.0 * PI
        } else if a < -PI {
            a + 2.0 * PI
        } else {
            a
        }
    }
}

impl fmt::Display for Pose2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(x: {:.3}, y: {:.3}, θ: {:.3} rad)", self.x, self.y, self.heading)
    }
}

/// A twist expressed in the robot body frame.
///
/// Used both for incoming velocity commands and for the velocity estimate the
/// integrator reports each tick.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Twist {
    /// Forward velocity (m/s).
    pub linear: f64,
    /// Turn rate around the body z-axis (rad/s).
    pub angular: f64,
}

impl Twist {
    /// The zero twist, i.e. "stand still".
    pub const ZERO: Twist = Twist::new(0.0, 0.0);

    /// Construct a new twist.
    ///
    /// # Arguments
    ///
    /// * `linear`: Forward velocity (m/s).
    /// * `angular`: Turn rate (rad/s).
    pub const fn new(linear: f64, angular: f64) -> Self {
        Twist { linear, angular }
    }

    /// Returns `true` when both components are finite.
    pub fn is_finite(&self) -> bool {
        self.linear.is_finite() && self.angular.is_finite()
    }
}

impl fmt::Display for Twist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(v: {:.3} m/s, ω: {:.3} rad/s)", self.linear, self.angular)
    }
}

/// Instantaneous body-frame velocity derived from one tick's wheel speeds.
pub type VelocityEstimate = Twist;

/// Measured linear speeds of the left and right wheel sets.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelPair {
    /// Left wheel linear speed (m/s).
    pub left_speed: f64,
    /// Right wheel linear speed (m/s).
    pub right_speed: f64,
}

impl WheelPair {
    /// Construct wheel speeds.
    pub const fn new(left_speed: f64, right_speed: f64) -> Self {
        WheelPair {
            left_speed,
            right_speed,
        }
    }

    /// Build a pair from wheel angular velocities (rad/s) and the wheel radius (m).
    pub fn from_angular(omega_left: f64, omega_right: f64, wheel_radius: f64) -> Self {
        WheelPair::new(omega_left * wheel_radius, omega_right * wheel_radius)
    }

    /// Returns `true` when both speeds are finite.
    pub fn is_finite(&self) -> bool {
        self.left_speed.is_finite() && self.right_speed.is_finite()
    }
}

impl fmt::Display for WheelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(vL: {:.3} m/s, vR: {:.3} m/s)", self.left_speed, self.right_speed)
    }
}

/// Target linear wheel speeds produced by the [`CommandShaper`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelTargets {
    /// Left wheel target speed (m/s).
    pub left_target: f64,
    /// Right wheel target speed (m/s).
    pub right_target: f64,
}

impl WheelTargets {
    /// Both wheels stopped.
    pub const ZERO: WheelTargets = WheelTargets::new(0.0, 0.0);

    /// Construct wheel targets.
    pub const fn new(left_target: f64, right_target: f64) -> Self {
        WheelTargets {
            left_target,
            right_target,
        }
    }
}

impl fmt::Display for WheelTargets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(tL: {:.3} m/s, tR: {:.3} m/s)",
            self.left_target, self.right_target
        )
    }
}

/// Speed and acceleration limits applied by the [`CommandShaper`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveLimits {
    /// Maximum wheel linear speed magnitude (m/s).
    max_speed: f64,
    /// Maximum wheel linear acceleration (m/s²). Zero or negative disables ramping.
    max_accel: f64,
}

impl DriveLimits {
    /// Construct limits from an explicit speed cap.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::InvalidConfiguration)` if `max_speed` is not
    /// positive or `max_accel` is not finite.
    pub fn new(max_speed: f64, max_accel: f64) -> Result<Self, KinematicsError> {
        if !(max_speed > 0.0) {
            return Err(KinematicsError::InvalidConfiguration(
                "max wheel speed must be positive",
            ));
        }
        if !max_accel.is_finite() {
            return Err(KinematicsError::InvalidConfiguration(
                "wheel acceleration must be finite",
            ));
        }
        Ok(DriveLimits {
            max_speed,
            max_accel,
        })
    }

    /// Derive the speed cap from the wheel motor's torque curve.
    ///
    /// The motor is modelled with a linear torque/speed characteristic
    /// `τ(ω) = wheel_torque - torque_speed_gradient * ω`, so the wheel cannot
    /// turn faster than `wheel_torque / torque_speed_gradient` rad/s. That rate
    /// times the wheel radius is the linear speed cap.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::InvalidConfiguration)` if the torque, the
    /// gradient or the diameter is not positive.
    pub fn from_torque(
        wheel_torque: f64,
        torque_speed_gradient: f64,
        wheel_diameter: f64,
        max_accel: f64,
    ) -> Result<Self, KinematicsError> {
        if !(wheel_torque > 0.0) {
            return Err(KinematicsError::InvalidConfiguration(
                "wheel torque must be positive",
            ));
        }
        if !(torque_speed_gradient > 0.0) {
            return Err(KinematicsError::InvalidConfiguration(
                "torque/speed gradient must be positive",
            ));
        }
        if !(wheel_diameter > 0.0) {
            return Err(KinematicsError::InvalidConfiguration(
                "wheel diameter must be positive",
            ));
        }
        let no_load_rate = wheel_torque / torque_speed_gradient;
        DriveLimits::new(no_load_rate * wheel_diameter / 2.0, max_accel)
    }

    /// Returns the wheel speed cap (m/s).
    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    /// Returns the wheel acceleration limit (m/s²).
    pub fn max_accel(&self) -> f64 {
        self.max_accel
    }
}

/// Converts wheel linear speeds into body-frame `(linear, angular)` velocity.
///
/// # Errors
///
/// Returns `Err(KinematicsError::InvalidConfiguration)` if `separation` is not positive.
pub fn wheel_speeds_to_body_velocity(
    left: f64,
    right: f64,
    separation: f64,
) -> Result<(f64, f64), KinematicsError> {
    if !(separation > 0.0) {
        return Err(KinematicsError::InvalidConfiguration(
            "wheel separation must be positive",
        ));
    }
    Ok(((left + right) / 2.0, (right - left) / separation))
}

/// Converts body-frame `(linear, angular)` velocity into `(left, right)` wheel speeds.
///
/// Exact inverse of [`wheel_speeds_to_body_velocity`].
///
/// # Errors
///
/// Returns `Err(KinematicsError::InvalidConfiguration)` if `separation` is not positive.
pub fn body_velocity_to_wheel_speeds(
    linear: f64,
    angular: f64,
    separation: f64,
) -> Result<(f64, f64), KinematicsError> {
    if !(separation > 0.0) {
        return Err(KinematicsError::InvalidConfiguration(
            "wheel separation must be positive",
        ));
    }
    let half_track = angular * separation / 2.0;
    Ok((linear - half_track, linear + half_track))
}

/// Differential‑drive geometry.
///
/// Holds the validated wheel separation and diameter. Once constructed, every
/// conversion below is infallible because the divisor is known to be positive.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifferentialDrive {
    /// Distance between left and right wheel centres (m).
    wheel_separation: f64,
    /// Wheel diameter (m).
    wheel_diameter: f64,
}

impl DifferentialDrive {
    /// Construct a new differential‑drive geometry.
    ///
    /// # Arguments
    ///
    /// * `wheel_separation`: The distance between the left and right wheel centres in meters.
    /// * `wheel_diameter`: The wheel diameter in meters.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::InvalidConfiguration)` if either value is not positive
    /// (NaN included).
    pub fn new(wheel_separation: f64, wheel_diameter: f64) -> Result<Self, KinematicsError> {
        if !(wheel_separation > 0.0) || !wheel_separation.is_finite() {
            return Err(KinematicsError::InvalidConfiguration(
                "wheel separation must be positive",
            ));
        }
        if !(wheel_diameter > 0.0) || !wheel_diameter.is_finite() {
            return Err(KinematicsError::InvalidConfiguration(
                "wheel diameter must be positive",
            ));
        }
        Ok(DifferentialDrive {
            wheel_separation,
            wheel_diameter,
        })
    }

    /// Returns the wheel separation.
    pub fn wheel_separation(&self) -> f64 {
        self.wheel_separation
    }

    /// Returns the wheel diameter.
    pub fn wheel_diameter(&self) -> f64 {
        self.wheel_diameter
    }

    /// Returns the wheel radius.
    pub fn wheel_radius(&self) -> f64 {
        self.wheel_diameter / 2.0
    }

    /// Wheel angular rate (rad/s) to rim speed (m/s).
    pub fn rate_to_speed(&self, omega: f64) -> f64 {
        omega * self.wheel_radius()
    }

    /// Rim speed (m/s) to wheel angular rate (rad/s).
    pub fn speed_to_rate(&self, speed: f64) -> f64 {
        speed / self.wheel_radius()
    }

    /// Body velocity produced by the given wheel speeds (forward kinematics).
    pub fn forward_kinematics(&self, wheels: WheelPair) -> Twist {
        Twist::new(
            (wheels.left_speed + wheels.right_speed) / 2.0,
            (wheels.right_speed - wheels.left_speed) / self.wheel_separation,
        )
    }

    /// Wheel speeds required for the given body velocity (inverse kinematics).
    pub fn inverse_kinematics(&self, twist: Twist) -> WheelPair {
        let half_track = twist.angular * self.wheel_separation / 2.0;
        WheelPair::new(twist.linear - half_track, twist.linear + half_track)
    }
}

impl fmt::Display for DifferentialDrive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DifferentialDrive (separation: {:.3} m, diameter: {:.3} m)",
            self.wheel_separation, self.wheel_diameter
        )
    }
}
