use parking_lot::RwLock;
use std::sync::Arc;

use autolabor_driver::DriveCycle;
use autolabor_driver::kinematics::{Pose2D, Twist};

/// Latest view of the simulation, written by the tick thread and read by the monitor.
#[derive(Clone, Debug, Default)]
pub struct SimState {
    pub truth: Pose2D,
    pub estimate: Pose2D,
    pub velocity: Twist,
    pub cycles: u64,
    pub last_cycle_stamp: f64,
    pub command_stale: bool,
    pub stale_cycles: u64,
}

pub type Blackboard = Arc<RwLock<SimState>>;

pub fn snapshot(bb: &Blackboard) -> SimState {
    (*bb.read()).clone()
}

pub fn record_cycle(bb: &Blackboard, cycle: &DriveCycle, truth: Pose2D) {
    let mut g = bb.write();
    g.truth = truth;
    g.estimate = cycle.odometry.pose;
    g.velocity = cycle.odometry.twist;
    g.cycles += 1;
    g.last_cycle_stamp = cycle.stamp;
    g.command_stale = cycle.command_stale;
    if cycle.command_stale {
        g.stale_cycles += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autolabor_driver::kinematics::WheelTargets;
    use autolabor_driver::{JointRates, OdometryRecord, Quaternion};

    fn cycle(stamp: f64, stale: bool) -> DriveCycle {
        DriveCycle {
            stamp,
            dt: 0.01,
            command: Twist::ZERO,
            command_stale: stale,
            targets: WheelTargets::ZERO,
            joint_targets: JointRates::default(),
            odometry: OdometryRecord {
                stamp,
                frame_id: "odom".into(),
                child_frame_id: "base_footprint".into(),
                pose: Pose2D::new(stamp, 0.0, 0.0),
                orientation: Quaternion::IDENTITY,
                twist: Twist::new(1.0, 0.0),
            },
        }
    }

    #[test]
    fn test_record_cycle_counts_and_overwrites() {
        let bb: Blackboard = Arc::default();
        record_cycle(&bb, &cycle(0.5, false), Pose2D::new(0.4, 0.0, 0.0));
        record_cycle(&bb, &cycle(1.0, true), Pose2D::new(0.9, 0.0, 0.0));

        let state = snapshot(&bb);
        assert_eq!(state.cycles, 2);
        assert_eq!(state.stale_cycles, 1);
        assert!(state.command_stale);
        assert_eq!(state.last_cycle_stamp, 1.0);
        assert_eq!(state.estimate, Pose2D::new(1.0, 0.0, 0.0));
        assert_eq!(state.truth, Pose2D::new(0.9, 0.0, 0.0));
    }
}
