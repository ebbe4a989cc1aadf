//! The tick-side controller: owns the scheduler, shaper and integrator, pulls
//! the newest command from the mailbox, and publishes what each update produced.

use std::sync::Arc;

use autolabor_kinematics::{
    CommandShaper, DifferentialDrive, OdomSource, OdometryIntegrator, Pose2D, Tick,
    UpdateScheduler, VelocityEstimate, WheelTargets,
};
use tracing::{debug, info, warn};

use crate::bus::Topic;
use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::ingress::SharedIngress;
use crate::joints::{JointRates, WHEEL_JOINT_COUNT, WheelJoint, WheelJoints};
use crate::messages::{DriveCycle, FrameTransform, JointState, OdometryRecord, Quaternion};

const TOPIC_CAPACITY: usize = 16;

/// Output topics the driver publishes on.
#[derive(Debug, Clone)]
pub struct DriverOutputs {
    /// Pose and velocity estimate, once per fired update.
    pub odometry: Topic<OdometryRecord>,
    /// odom→base, world→odom and base→wheel transforms, as enabled.
    pub transforms: Topic<FrameTransform>,
    /// Wheel joint angles and rates.
    pub joint_states: Topic<JointState>,
    /// Full record of each fired update, including the wheel targets.
    pub cycles: Topic<DriveCycle>,
}

impl Default for DriverOutputs {
    fn default() -> Self {
        DriverOutputs {
            odometry: Topic::new("odom", TOPIC_CAPACITY),
            transforms: Topic::new("tf", TOPIC_CAPACITY),
            joint_states: Topic::new("joint_states", TOPIC_CAPACITY),
            cycles: Topic::new("drive_cycles", TOPIC_CAPACITY),
        }
    }
}

/// Frame ids with the tf prefix already applied, built once.
#[derive(Debug, Clone)]
struct Frames {
    odometry: Arc<str>,
    base: Arc<str>,
    world: Arc<str>,
    wheels: [Arc<str>; WHEEL_JOINT_COUNT],
}

impl Frames {
    fn new(config: &DriverConfig) -> Self {
        Frames {
            odometry: config.prefixed(&config.odometry_frame).into(),
            base: config.prefixed(&config.robot_base_frame).into(),
            world: config.prefixed(&config.world_frame).into(),
            wheels: WheelJoint::ALL.map(|joint| Arc::from(config.prefixed(joint.name()))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PublishFlags {
    odom_tf: bool,
    wheel_tf: bool,
    world_tf: bool,
    joint_state: bool,
}

/// Four-wheel differential-drive controller.
///
/// Call [`FourWheelDiffDriver::update`] from the driving loop on every tick.
/// Commands arrive through the shared [`crate::CommandIngress`] from any thread.
pub struct FourWheelDiffDriver {
    drive: DifferentialDrive,
    shaper: CommandShaper,
    integrator: OdometryIntegrator,
    scheduler: UpdateScheduler,
    joints: WheelJoints,
    targets: WheelTargets,
    ingress: SharedIngress,
    outputs: DriverOutputs,
    frames: Frames,
    flags: PublishFlags,
    command_timeout: f64,
    wheelbase: f64,
    command_was_stale: bool,
}

impl FourWheelDiffDriver {
    /// Build the controller. Any configuration problem is returned here and the driver never starts.
    pub fn new(
        config: &DriverConfig,
        ingress: SharedIngress,
        outputs: DriverOutputs,
        start_time: f64,
    ) -> Result<Self, DriverError> {
        config.validate()?;
        let drive = config.drive()?;
        let limits = config.limits()?;
        let scheduler = UpdateScheduler::from_rate(config.update_rate, start_time);

        info!(
            %drive,
            max_speed = limits.max_speed(),
            max_accel = limits.max_accel(),
            update_period = scheduler.update_period(),
            command_timeout = config.command_timeout,
            source = ?config.odometry_source,
            "Four-wheel differential drive configured"
        );
        if scheduler.is_unthrottled() {
            info!("Update rate is not positive; updating on every tick");
        }

        Ok(FourWheelDiffDriver {
            drive,
            shaper: CommandShaper::new(drive, limits),
            integrator: OdometryIntegrator::new(drive, config.odometry_source),
            scheduler,
            joints: WheelJoints::new(),
            targets: WheelTargets::ZERO,
            ingress,
            outputs,
            frames: Frames::new(config),
            flags: PublishFlags {
                odom_tf: config.publish_odom_tf,
                wheel_tf: config.publish_wheel_tf,
                world_tf: config.publish_world_tf,
                joint_state: config.publish_wheel_joint_state,
            },
            command_timeout: config.command_timeout,
            wheelbase: config.wheelbase,
            command_was_stale: false,
        })
    }

    /// Validated drive geometry.
    pub fn drive(&self) -> &DifferentialDrive {
        &self.drive
    }

    /// The command mailbox this driver reads from.
    pub fn ingress(&self) -> &SharedIngress {
        &self.ingress
    }

    /// Topics the driver publishes on.
    pub fn outputs(&self) -> &DriverOutputs {
        &self.outputs
    }

    /// Current pose estimate in the odometry frame.
    pub fn pose(&self) -> Pose2D {
        self.integrator.pose()
    }

    /// Body velocity measured on the last fired update.
    pub fn velocity(&self) -> VelocityEstimate {
        self.integrator.velocity()
    }

    /// Linear wheel targets (m/s) handed to the actuation side.
    pub fn targets(&self) -> WheelTargets {
        self.targets
    }

    /// Where the pose comes from.
    pub fn odometry_source(&self) -> OdomSource {
        self.integrator.source()
    }

    /// Return to the origin at rest, re-anchoring the schedule at `now`.
    ///
    /// The pending command is dropped as well, so the robot stays put until a new one arrives.
    pub fn reset(&mut self, now: f64) {
        info!(now, "Resetting drive state");
        self.integrator.reset(Pose2D::default());
        self.joints.reset();
        self.targets = WheelTargets::ZERO;
        self.scheduler.reset(now);
        self.ingress.clear(now);
        self.command_was_stale = false;
    }

    /// Feed one tick from the driving loop.
    ///
    /// `rates` are the measured wheel joint rates (rad/s). `ground_truth` is the
    /// externally known pose, used only with [`OdomSource::WorldTruth`] and for
    /// the world transform. Returns `None` when no update was due.
    pub fn update(
        &mut self,
        now: f64,
        rates: &JointRates,
        ground_truth: Option<Pose2D>,
    ) -> Option<DriveCycle> {
        let dt = match self.scheduler.tick(now) {
            Tick::Idle => return None,
            Tick::Due { dt } => dt,
            Tick::Malformed => {
                warn!(now, "Ignoring tick with malformed timestamp");
                return None;
            }
            Tick::Rewound => {
                warn!(
                    now,
                    "Clock went backwards; rebasing the update schedule and dropping the command"
                );
                // The stored stamp belongs to the old timeline.
                self.ingress.clear(now);
                self.command_was_stale = false;
                return None;
            }
        };

        let state = self.ingress.fetch();
        let command_stale = state.is_stale(now, self.command_timeout);
        if command_stale && !self.command_was_stale {
            warn!(
                age = now - state.timestamp,
                timeout = self.command_timeout,
                "Velocity command timed out, stopping"
            );
        } else if !command_stale && self.command_was_stale {
            info!("Velocity commands resumed");
        }
        self.command_was_stale = command_stale;
        let command = state.effective(now, self.command_timeout);

        self.targets = self.shaper.shape(command, self.targets, dt);

        let wheels = rates.to_wheel_pair(&self.drive);
        let update = match self.integrator.integrate(wheels, ground_truth, dt) {
            Ok(update) => update,
            Err(e) => {
                warn!(now, dt, error = %e, "Skipping odometry update");
                return None;
            }
        };
        if update.substituted_wheels {
            warn!(
                left = wheels.left_speed,
                right = wheels.right_speed,
                "Malformed wheel speed sample, reusing last valid measurement"
            );
        }
        if update.missing_ground_truth {
            warn!("World-truth odometry selected but no valid ground truth was supplied");
        }
        if self.joints.advance(rates, dt) > 0 {
            debug!("Joint angle integration reused previous rates");
        }

        let odometry = OdometryRecord {
            stamp: now,
            frame_id: Arc::clone(&self.frames.odometry),
            child_frame_id: Arc::clone(&self.frames.base),
            pose: update.pose,
            orientation: Quaternion::from_yaw(update.pose.heading),
            twist: update.velocity,
        };

        debug!(
            stamp = now,
            dt,
            left = self.targets.left_target,
            right = self.targets.right_target,
            x = update.pose.x,
            y = update.pose.y,
            heading = update.pose.heading,
            "Drive update"
        );

        self.publish_frames(now, &update.pose, ground_truth);
        if self.flags.joint_state {
            self.outputs.joint_states.publish(JointState {
                stamp: now,
                names: self.frames.wheels.clone(),
                positions: self.joints.positions(),
                velocities: self.joints.rates(),
            });
        }
        self.outputs.odometry.publish(odometry.clone());

        let cycle = DriveCycle {
            stamp: now,
            dt,
            command,
            command_stale,
            targets: self.targets,
            joint_targets: JointRates::from_targets(&self.targets, &self.drive),
            odometry,
        };
        self.outputs.cycles.publish(cycle.clone());
        Some(cycle)
    }

    fn publish_frames(&self, now: f64, pose: &Pose2D, ground_truth: Option<Pose2D>) {
        if self.flags.odom_tf {
            self.outputs.transforms.publish(FrameTransform::planar(
                now,
                Arc::clone(&self.frames.odometry),
                Arc::clone(&self.frames.base),
                pose,
            ));
        }

        if self.flags.world_tf {
            // world -> odom is whatever makes world -> odom -> base match the truth.
            match ground_truth.filter(Pose2D::is_finite) {
                Some(truth) => {
                    let world_to_odom = truth.compose(&pose.inverse());
                    self.outputs.transforms.publish(FrameTransform::planar(
                        now,
                        Arc::clone(&self.frames.world),
                        Arc::clone(&self.frames.odometry),
                        &world_to_odom,
                    ));
                }
                None => debug!("No ground truth, world transform skipped"),
            }
        }

        if self.flags.wheel_tf {
            let positions = self.joints.positions();
            for (i, joint) in WheelJoint::ALL.into_iter().enumerate() {
                let (x, y) = joint.mount_offset(self.wheelbase, self.drive.wheel_separation());
                self.outputs.transforms.publish(FrameTransform {
                    stamp: now,
                    parent: Arc::clone(&self.frames.base),
                    child: Arc::clone(&self.frames.wheels[i]),
                    translation: [x, y, self.drive.wheel_radius()],
                    rotation: Quaternion::from_pitch(positions[i]),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingress::CommandIngress;
    use autolabor_kinematics::Twist;
    const EPSILON: f64 = 1e-9;

    fn config() -> DriverConfig {
        DriverConfig {
            wheel_separation: 0.5,
            wheel_diameter: 0.2,
            max_wheel_speed: Some(2.0),
            wheel_accel: 1.0,
            update_rate: 10.0,
            command_timeout: 0.5,
            ..DriverConfig::default()
        }
    }

    fn driver(config: &DriverConfig) -> FourWheelDiffDriver {
        FourWheelDiffDriver::new(config, CommandIngress::shared(), DriverOutputs::default(), 0.0)
            .unwrap()
    }

    #[test]
    fn test_invalid_geometry_prevents_start() {
        let bad = DriverConfig {
            wheel_separation: -1.0,
            ..config()
        };
        let result =
            FourWheelDiffDriver::new(&bad, CommandIngress::shared(), DriverOutputs::default(), 0.0);
        assert!(matches!(result, Err(DriverError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_idle_ticks_produce_nothing() {
        let mut d = driver(&config());
        assert!(d.update(0.05, &JointRates::default(), None).is_none());
        assert!(d.update(0.1, &JointRates::default(), None).is_some());
    }

    #[test]
    fn test_shapes_then_integrates() {
        let mut d = driver(&config());
        d.ingress().publish(Twist::new(1.0, 0.0), 0.0).unwrap();
        // measured: both sides at 10 rad/s -> 1 m/s
        let cycle = d.update(0.1, &JointRates::sides(10.0, 10.0), None).unwrap();
        assert!((cycle.dt - 0.1).abs() < EPSILON);
        assert!((cycle.targets.left_target - 0.1).abs() < EPSILON);
        assert!((cycle.joint_targets.front_left - 1.0).abs() < EPSILON);
        assert!((cycle.odometry.pose.x - 0.1).abs() < EPSILON);
        assert!((cycle.odometry.twist.linear - 1.0).abs() < EPSILON);
        assert!(!cycle.command_stale);
    }

    #[test]
    fn test_stale_command_ramps_down() {
        let mut d = driver(&config());
        d.ingress().publish(Twist::new(1.0, 0.0), 0.0).unwrap();
        let mut now = 0.0;
        for _ in 0..5 {
            now += 0.1;
            d.update(now, &JointRates::default(), None).unwrap();
        }
        assert!((d.targets().left_target - 0.5).abs() < EPSILON);

        now += 0.1;
        let cycle = d.update(now, &JointRates::default(), None).unwrap();
        assert!(cycle.command_stale);
        assert_eq!(cycle.command, Twist::ZERO);
        assert!((cycle.targets.left_target - 0.4).abs() < EPSILON);
    }

    #[test]
    fn test_malformed_timestamp_is_absorbed() {
        let mut d = driver(&config());
        assert!(d.update(f64::NAN, &JointRates::default(), None).is_none());
        assert!(d.update(0.1, &JointRates::default(), None).is_some());
    }

    #[test]
    fn test_reset_returns_to_origin() {
        let mut d = driver(&config());
        d.ingress().publish(Twist::new(1.0, 0.0), 0.0).unwrap();
        d.update(0.1, &JointRates::sides(10.0, 10.0), None).unwrap();
        d.reset(0.1);
        assert_eq!(d.pose(), Pose2D::default());
        assert_eq!(d.targets(), WheelTargets::ZERO);
        assert!(d.update(0.15, &JointRates::default(), None).is_none());
    }

    #[test]
    fn test_reset_drops_pending_command() {
        let mut d = driver(&config());
        d.ingress().publish(Twist::new(1.0, 0.0), 10.0).unwrap();
        d.update(10.1, &JointRates::default(), None).unwrap();
        assert!(d.targets().left_target > 0.0);

        d.reset(0.0);
        assert_eq!(d.ingress().fetch().command, Twist::ZERO);
        let cycle = d.update(0.1, &JointRates::default(), None).unwrap();
        assert_eq!(cycle.command, Twist::ZERO);
        assert!(!cycle.command_stale);
        assert_eq!(cycle.targets, WheelTargets::ZERO);
    }

    #[test]
    fn test_rewind_rebases_then_fires_one_period_later() {
        let mut d = driver(&config());
        d.ingress().publish(Twist::new(1.0, 0.0), 10.0).unwrap();
        d.update(10.1, &JointRates::default(), None).unwrap();

        assert!(d.update(0.0, &JointRates::default(), None).is_none());
        assert_eq!(d.ingress().fetch().command, Twist::ZERO);
        assert!(d.update(0.05, &JointRates::default(), None).is_none());

        let cycle = d.update(0.1, &JointRates::default(), None).unwrap();
        assert!((cycle.dt - 0.1).abs() < EPSILON);
        assert_eq!(cycle.command, Twist::ZERO);
        // Ramping down from 1.0 instead of continuing toward the old command.
        assert!((cycle.targets.left_target - 0.9).abs() < EPSILON);
    }

    #[test]
    fn test_publishes_enabled_outputs_only() {
        let config = DriverConfig {
            publish_odom_tf: true,
            publish_wheel_tf: true,
            publish_world_tf: true,
            publish_wheel_joint_state: false,
            ..config()
        };
        let mut d = driver(&config);
        let mut odom_rx = d.outputs().odometry.subscribe();
        let mut tf_rx = d.outputs().transforms.subscribe();
        let mut joints_rx = d.outputs().joint_states.subscribe();

        d.update(0.1, &JointRates::sides(10.0, 10.0), Some(Pose2D::new(5.0, 5.0, 0.0)))
            .unwrap();

        let odom = odom_rx.try_recv().unwrap();
        assert_eq!(&*odom.frame_id, "odom");
        assert_eq!(&*odom.child_frame_id, "base_footprint");

        let mut transforms = Vec::new();
        while let Ok(tf) = tf_rx.try_recv() {
            transforms.push(tf);
        }
        // odom->base, world->odom, four wheels
        assert_eq!(transforms.len(), 6);
        let world = transforms
            .iter()
            .find(|tf| &*tf.parent == "world")
            .unwrap();
        // odom pose is (0.1, 0, 0), truth is (5, 5, 0) -> world->odom is (4.9, 5, 0)
        assert!((world.translation[0] - 4.9).abs() < EPSILON);
        assert!((world.translation[1] - 5.0).abs() < EPSILON);

        assert!(joints_rx.try_recv().is_err());
    }
}
