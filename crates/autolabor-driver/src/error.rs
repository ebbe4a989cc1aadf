//! Error types for the driver crate.

use autolabor_kinematics::KinematicsError;
use config::ConfigError;
use thiserror::Error;

/// Errors raised while configuring or feeding the driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Geometry or limits rejected by the kinematics core. Fatal at startup.
    #[error("invalid drive configuration: {0}")]
    InvalidConfiguration(#[from] KinematicsError),

    /// The configuration source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    /// A velocity command carried NaN or infinite values.
    #[error("rejected non-finite velocity command (linear: {linear}, angular: {angular}, stamp: {stamp})")]
    MalformedCommand {
        /// Commanded forward velocity.
        linear: f64,
        /// Commanded turn rate.
        angular: f64,
        /// Arrival stamp.
        stamp: f64,
    },
}
