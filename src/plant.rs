//! Stand-in for the motors and the world: each wheel joint lags its commanded
//! rate with a first-order response, and the true pose is integrated from what
//! the wheels actually do.

use autolabor_driver::JointRates;
use autolabor_driver::kinematics::{DifferentialDrive, Pose2D};

#[derive(Debug, Clone)]
pub struct WheelPlant {
    drive: DifferentialDrive,
    /// Motor time constant (s). Zero or less tracks targets instantly.
    time_constant: f64,
    targets: JointRates,
    rates: JointRates,
    truth: Pose2D,
}

impl WheelPlant {
    pub fn new(drive: DifferentialDrive, time_constant: f64) -> Self {
        WheelPlant {
            drive,
            time_constant,
            targets: JointRates::default(),
            rates: JointRates::default(),
            truth: Pose2D::default(),
        }
    }

    pub fn set_targets(&mut self, targets: JointRates) {
        self.targets = targets;
    }

    /// Advance the motors and the true pose by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        if !(dt > 0.0) {
            return;
        }

        if self.time_constant > 0.0 {
            let alpha = 1.0 - (-dt / self.time_constant).exp();
            let lag = |current: f64, target: f64| current + (target - current) * alpha;
            self.rates = JointRates::new(
                lag(self.rates.front_left, self.targets.front_left),
                lag(self.rates.rear_left, self.targets.rear_left),
                lag(self.rates.front_right, self.targets.front_right),
                lag(self.rates.rear_right, self.targets.rear_right),
            );
        } else {
            self.rates = self.targets;
        }

        let twist = self
            .drive
            .forward_kinematics(self.rates.to_wheel_pair(&self.drive));
        // Midpoint heading, so the truth drifts slightly from the Euler estimate on curves.
        let heading = self.truth.heading + twist.angular * dt / 2.0;
        self.truth = Pose2D::new(
            self.truth.x + twist.linear * heading.cos() * dt,
            self.truth.y + twist.linear * heading.sin() * dt,
            self.truth.heading + twist.angular * dt,
        );
    }

    /// Joint rates as an encoder would report them.
    pub fn measured(&self) -> JointRates {
        self.rates
    }

    pub fn truth(&self) -> Pose2D {
        self.truth
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
    fn test_instant_plant_tracks_targets() {
        let mut plant = WheelPlant::new(drive(), 0.0);
        plant.set_targets(JointRates::sides(3.0, -2.0));
        plant.step(0.01);
        assert_eq!(plant.measured(), JointRates::sides(3.0, -2.0));
    }

    #[test]
    fn test_first_order_lag() {
        let mut plant = WheelPlant::new(drive(), 0.1);
        plant.set_targets(JointRates::sides(10.0, 10.0));
        plant.step(0.1);
        let expected = 10.0 * (1.0 - (-1.0f64).exp());
        assert!((plant.measured().front_left - expected).abs() < EPSILON);
        assert!(plant.measured().front_left < 10.0);
    }

    #[test]
    fn test_truth_straight_line() {
        let mut plant = WheelPlant::new(drive(), 0.0);
        plant.set_targets(JointRates::sides(10.0, 10.0));
        plant.step(0.5);
        plant.step(0.5);
        let truth = plant.truth();
        assert!((truth.x - 1.0).abs() < EPSILON);
        assert!(truth.y.abs() < EPSILON);
        assert!(truth.heading.abs() < EPSILON);
    }

    #[test]
    fn test_truth_spin_in_place() {
        let mut plant = WheelPlant::new(drive(), 0.0);
        plant.set_targets(JointRates::sides(-5.0, 5.0));
        plant.step(0.25);
        let truth = plant.truth();
        assert!((truth.heading - 0.5).abs() < EPSILON);
        assert!(truth.x.abs() < EPSILON);
        assert!(truth.y.abs() < EPSILON);
    }

    #[test]
    fn test_non_positive_dt_is_ignored() {
        let mut plant = WheelPlant::new(drive(), 0.0);
        plant.set_targets(JointRates::sides(10.0, 10.0));
        plant.step(0.0);
        plant.step(-1.0);
        plant.step(f64::NAN);
        assert_eq!(plant.measured(), JointRates::default());
        assert_eq!(plant.truth(), Pose2D::default());
    }
}
