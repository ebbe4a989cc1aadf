//! Adapter layer for a four-wheel differential-drive robot.
//!
//! The pure math lives in [`autolabor_kinematics`]. This crate owns everything
//! that touches threads and the outside world: the command mailbox and its lock,
//! the per-tick update loop, configuration loading, and the output topics.

pub mod bus;
pub mod config;
pub mod driver;
pub mod error;
pub mod ingress;
pub mod joints;
pub mod messages;

pub use autolabor_kinematics as kinematics;
pub use bus::Topic;
pub use config::{DEFAULT_CONFIG_PATH, DriverConfig, load_config};
pub use driver::{DriverOutputs, FourWheelDiffDriver};
pub use error::DriverError;
pub use ingress::{CommandIngress, SharedIngress};
pub use joints::{JointRates, WheelJoint, WheelJoints};
pub use messages::{DriveCycle, FrameTransform, JointState, OdometryRecord, Quaternion};
