//! Error types for the drive core.
//!
//! Configuration problems are fatal and surface at construction time. Per-tick
//! data problems are reported so the caller can log them, but never stop the
//! control loop.

use core::fmt;

/// Errors that can occur in kinematic calculations.
#[derive(Debug, Clone, PartialEq)]
pub enum KinematicsError {
    /// A physical parameter is out of range.
    /// Returned when wheel separation, wheel diameter or a torque parameter is not positive.
    InvalidConfiguration(&'static str),
    /// Error for negative time delta.
    /// This variant is returned when a negative or non-finite time delta is used for pose updates.
    NegativeTimeDelta(&'static str),
    /// A sensor sample or timestamp was NaN or infinite.
    MalformedMeasurement(&'static str),
}

impl fmt::Display for KinematicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KinematicsError::InvalidConfiguration(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
            KinematicsError::NegativeTimeDelta(msg) => write!(f, "Negative time delta: {}", msg),
            KinematicsError::MalformedMeasurement(msg) => {
                write!(f, "Malformed measurement: {}", msg)
            }
        }
    }
}

impl core::error::Error for KinematicsError {}
