//! Velocity command shaping.
//!
//! Converts the latest body-frame command into per-wheel targets, ramping each
//! wheel toward its desired speed by at most `max_accel * dt` per tick and then
//! clamping to the torque-derived speed cap. Acceleration and deceleration share
//! the same rate.

use libm::fabs;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{DifferentialDrive, DriveLimits, Twist, WheelTargets};

/// The last received velocity command and when it arrived.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandState {
    /// Commanded body-frame velocity.
    pub command: Twist,
    /// Arrival time (s) on the same clock that drives the scheduler.
    pub timestamp: f64,
}

impl CommandState {
    /// Construct a command stamped with its arrival time.
    pub const fn new(command: Twist, timestamp: f64) -> Self {
        CommandState { command, timestamp }
    }

    /// Returns `true` once more than `timeout` seconds have passed since arrival.
    ///
    /// A stamp more than `timeout` seconds ahead of `now` is stale as well: the
    /// clock has gone backwards past it. A non-positive `timeout` disables the
    /// watchdog. A non-finite stamp is always stale.
    pub fn is_stale(&self, now: f64, timeout: f64) -> bool {
        if !self.timestamp.is_finite() {
            return true;
        }
        timeout > 0.0 && fabs(now - self.timestamp) > timeout
    }

    /// The command to act on at `now`: the stored one, or zero if it has gone stale.
    pub fn effective(&self, now: f64, timeout: f64) -> Twist {
        if self.is_stale(now, timeout) {
            Twist::ZERO
        } else {
            self.command
        }
    }
}

impl Default for CommandState {
    /// No command received yet: zero velocity, stamped at time zero.
    fn default() -> Self {
        CommandState::new(Twist::ZERO, 0.0)
    }
}

/// Turns body-frame commands into rate- and magnitude-limited wheel targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandShaper {
    drive: DifferentialDrive,
    limits: DriveLimits,
}

impl CommandShaper {
    /// Construct a shaper for the given geometry and limits.
    pub const fn new(drive: DifferentialDrive, limits: DriveLimits) -> Self {
        CommandShaper { drive, limits }
    }

    /// Returns the limits this shaper enforces.
    pub fn limits(&self) -> &DriveLimits {
        &self.limits
    }

    /// Compute the next wheel targets.
    ///
    /// `dt <= 0` (or NaN) leaves `previous` untouched. A non-finite command is
    /// treated as a zero command.
    pub fn shape(&self, command: Twist, previous: WheelTargets, dt: f64) -> WheelTargets {
        if !(dt > 0.0) {
            return previous;
        }
        let command = if command.is_finite() {
            command
        } else {
            Twist::ZERO
        };

        let desired = self.drive.inverse_kinematics(command);
        let max_delta = self.limits.max_accel() * dt;
        let max_speed = self.limits.max_speed();

        WheelTargets::new(
            ramp(previous.left_target, desired.left_speed, max_delta).clamp(-max_speed, max_speed),
            ramp(previous.right_target, desired.right_speed, max_delta)
                .clamp(-max_speed, max_speed),
        )
    }

    /// Shape the command held in `state`, substituting zero if the watchdog expired.
    pub fn shape_state(
        &self,
        state: &CommandState,
        previous: WheelTargets,
        now: f64,
        dt: f64,
        timeout: f64,
    ) -> WheelTargets {
        self.shape(state.effective(now, timeout), previous, dt)
    }
}

/// Move `current` toward `desired` by at most `max_delta`.
///
/// A non-positive `max_delta` means the acceleration limit is disabled and the
/// desired value is returned directly.
fn ramp(current: f64, desired: f64, max_delta: f64) -> f64 {
    if max_delta <= 0.0 || !current.is_finite() {
        return desired;
    }
    let step = desired - current;
    if fabs(step) <= max_delta {
        desired
    } else {
        current + step.clamp(-max_delta, max_delta)
    }
}
