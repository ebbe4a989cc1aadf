//! Dead-reckoning odometry.
//!
//! Integrates body-frame velocity into a 2-D pose with a first-order forward
//! Euler step. Position is advanced with the heading from *before* the step,
//! then the heading is advanced. Keep that order: recorded trajectories are
//! compared bit-for-bit against it.

use libm::{cos, sin};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{DifferentialDrive, KinematicsError, Pose2D, VelocityEstimate, WheelPair};

/// Where the pose estimate comes from. Fixed at construction.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OdomSource {
    /// Integrate measured wheel speeds.
    #[default]
    Encoder,
    /// Copy the pose from an externally supplied ground truth.
    #[cfg_attr(feature = "serde", serde(alias = "world"))]
    WorldTruth,
}

/// Result of one integration step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdometryUpdate {
    /// Pose after the step.
    pub pose: Pose2D,
    /// Body velocity derived from this step's wheel speeds.
    pub velocity: VelocityEstimate,
    /// The wheel sample was not finite and the last valid one was used instead.
    pub substituted_wheels: bool,
    /// Ground truth was expected but missing or not finite; the previous pose was kept.
    pub missing_ground_truth: bool,
}

/// Accumulates pose and velocity across scheduler ticks.
#[derive(Debug, Clone)]
pub struct OdometryIntegrator {
    drive: DifferentialDrive,
    source: OdomSource,
    pose: Pose2D,
    velocity: VelocityEstimate,
    last_valid_wheels: WheelPair,
}

impl OdometryIntegrator {
    /// Start integrating from the origin.
    pub fn new(drive: DifferentialDrive, source: OdomSource) -> Self {
        OdometryIntegrator::with_pose(drive, source, Pose2D::default())
    }

    /// Start integrating from `initial`.
    pub fn with_pose(drive: DifferentialDrive, source: OdomSource, initial: Pose2D) -> Self {
        OdometryIntegrator {
            drive,
            source,
            pose: initial,
            velocity: VelocityEstimate::ZERO,
            last_valid_wheels: WheelPair::default(),
        }
    }

    /// The configured pose source.
    pub fn source(&self) -> OdomSource {
        self.source
    }

    /// Current pose estimate.
    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    /// Velocity estimate from the most recent step.
    pub fn velocity(&self) -> VelocityEstimate {
        self.velocity
    }

    /// Forget everything and restart from `pose` at rest.
    pub fn reset(&mut self, pose: Pose2D) {
        self.pose = pose;
        self.velocity = VelocityEstimate::ZERO;
        self.last_valid_wheels = WheelPair::default();
    }

    /// Advance the estimate by `dt` seconds.
    ///
    /// `ground_truth` is only consulted when the source is
    /// [`OdomSource::WorldTruth`]. The velocity estimate always comes from
    /// `wheels`, whichever source feeds the pose.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::NegativeTimeDelta)` if `dt` is negative or
    /// not finite. State is left untouched in that case.
    pub fn integrate(
        &mut self,
        wheels: WheelPair,
        ground_truth: Option<Pose2D>,
        dt: f64,
    ) -> Result<OdometryUpdate, KinematicsError> {
        if !(dt >= 0.0) || !dt.is_finite() {
            return Err(KinematicsError::NegativeTimeDelta(
                "must be finite and non-negative",
            ));
        }

        let substituted_wheels = !wheels.is_finite();
        if !substituted_wheels {
            self.last_valid_wheels = wheels;
        }
        let velocity = self.drive.forward_kinematics(self.last_valid_wheels);

        let mut missing_ground_truth = false;
        match self.source {
            OdomSource::Encoder => {
                let heading = self.pose.heading;
                self.pose.x += velocity.linear * cos(heading) * dt;
                self.pose.y += velocity.linear * sin(heading) * dt;
                self.pose.heading += velocity.angular * dt;
            }
            OdomSource::WorldTruth => match ground_truth {
                Some(truth) if truth.is_finite() => self.pose = truth,
                _ => missing_ground_truth = true,
            },
        }
        self.velocity = velocity;

        Ok(OdometryUpdate {
            pose: self.pose,
            velocity,
            substituted_wheels,
            missing_ground_truth,
        })
    }
}
