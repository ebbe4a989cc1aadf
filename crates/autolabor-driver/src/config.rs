use std::path::Path;

use autolabor_kinematics::{DifferentialDrive, DriveLimits, OdomSource};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::{error, info};

use crate::error::DriverError;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variables named `AUTOLABOR_<SECTION>__<KEY>` override file values.
const ENV_PREFIX: &str = "AUTOLABOR";

/// Table in the configuration file holding [`DriverConfig`].
const DRIVER_SECTION: &str = "driver";

/// Static drive parameters, read once at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Distance between left and right wheel centres (m).
    pub wheel_separation: f64,
    /// Distance between front and rear axles (m). Only used to place wheel frames.
    pub wheelbase: f64,
    pub wheel_diameter: f64,
    /// Stall torque of one wheel motor (N·m).
    pub wheel_torque: f64,
    /// Slope of the linear motor torque/speed curve (N·m per rad/s).
    pub torque_speed_gradient: f64,
    /// Explicit wheel speed cap (m/s); replaces the torque-derived one when set.
    pub max_wheel_speed: Option<f64>,
    /// Wheel acceleration limit (m/s²). Zero or less disables ramping.
    pub wheel_accel: f64,
    /// Update rate (Hz). Zero or less updates on every tick.
    pub update_rate: f64,
    /// Seconds without a command before falling back to zero. Zero or less disables the watchdog.
    pub command_timeout: f64,
    pub odometry_source: OdomSource,

    pub odometry_frame: String,
    pub robot_base_frame: String,
    pub world_frame: String,
    pub tf_prefix: String,

    pub publish_odom_tf: bool,
    pub publish_wheel_tf: bool,
    pub publish_world_tf: bool,
    pub publish_wheel_joint_state: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            wheel_separation: 0.5,
            wheelbase: 0.4,
            wheel_diameter: 0.25,
            wheel_torque: 20.0,
            torque_speed_gradient: 2.0,
            max_wheel_speed: None,
            wheel_accel: 1.0,
            update_rate: 100.0,
            command_timeout: 0.5,
            odometry_source: OdomSource::Encoder,
            odometry_frame: "odom".to_string(),
            robot_base_frame: "base_footprint".to_string(),
            world_frame: "world".to_string(),
            tf_prefix: String::new(),
            publish_odom_tf: true,
            publish_wheel_tf: false,
            publish_world_tf: false,
            publish_wheel_joint_state: true,
        }
    }
}

impl DriverConfig {
    /// Read the `[driver]` table from a loaded configuration. A missing table yields defaults.
    pub fn from_config(settings: &Config) -> Result<Self, DriverError> {
        match settings.get::<DriverConfig>(DRIVER_SECTION) {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) => {
                info!("No [{}] table in configuration, using defaults", DRIVER_SECTION);
                Ok(DriverConfig::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Validated wheel geometry.
    pub fn drive(&self) -> Result<DifferentialDrive, DriverError> {
        Ok(DifferentialDrive::new(self.wheel_separation, self.wheel_diameter)?)
    }

    /// Speed and acceleration limits, torque-derived unless `max_wheel_speed` is set.
    pub fn limits(&self) -> Result<DriveLimits, DriverError> {
        let limits = match self.max_wheel_speed {
            Some(max_speed) => DriveLimits::new(max_speed, self.wheel_accel)?,
            None => DriveLimits::from_torque(
                self.wheel_torque,
                self.torque_speed_gradient,
                self.wheel_diameter,
                self.wheel_accel,
            )?,
        };
        Ok(limits)
    }

    /// Check every parameter the driver depends on.
    pub fn validate(&self) -> Result<(), DriverError> {
        self.drive()?;
        self.limits()?;
        if !self.update_rate.is_finite() || !self.command_timeout.is_finite() {
            return Err(DriverError::InvalidConfiguration(
                autolabor_kinematics::KinematicsError::InvalidConfiguration(
                    "update rate and command timeout must be finite",
                ),
            ));
        }
        if !(self.wheelbase >= 0.0) {
            return Err(DriverError::InvalidConfiguration(
                autolabor_kinematics::KinematicsError::InvalidConfiguration(
                    "wheelbase must not be negative",
                ),
            ));
        }
        Ok(())
    }

    /// `frame` with the tf prefix applied, if one is configured.
    pub fn prefixed(&self, frame: &str) -> String {
        if self.tf_prefix.is_empty() {
            frame.to_string()
        } else {
            format!("{}/{}", self.tf_prefix.trim_end_matches('/'), frame)
        }
    }
}

/// Load a TOML configuration file, layering `AUTOLABOR_*` environment overrides on top.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    info!("Attempting to load configuration from {}", path.display());

    let settings = Config::builder()
        .add_source(File::from(path).format(FileFormat::Toml).required(true))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build();

    match settings {
        Ok(config) => {
            info!("Successfully loaded configuration from {}", path.display());
            Ok(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_defaults_are_valid() {
        let config = DriverConfig::default();
        config.validate().unwrap();
        assert!((config.limits().unwrap().max_speed() - 1.25).abs() < EPSILON);
    }

    #[test]
    fn test_explicit_speed_cap_wins() {
        let config = DriverConfig {
            max_wheel_speed: Some(0.8),
            ..DriverConfig::default()
        };
        assert!((config.limits().unwrap().max_speed() - 0.8).abs() < EPSILON);
    }

    #[test]
    fn test_bad_geometry_is_rejected() {
        let config = DriverConfig {
            wheel_separation: 0.0,
            ..DriverConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DriverError::InvalidConfiguration(_))
        ));

        let config = DriverConfig {
            wheel_diameter: -0.1,
            ..DriverConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_update_rate_is_not_an_error() {
        let config = DriverConfig {
            update_rate: -10.0,
            ..DriverConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_prefixed_frames() {
        let mut config = DriverConfig::default();
        assert_eq!(config.prefixed("odom"), "odom");
        config.tf_prefix = "robot1/".to_string();
        assert_eq!(config.prefixed("odom"), "robot1/odom");
    }
}
