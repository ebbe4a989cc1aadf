//! Latest-value command mailbox shared between the command-arrival path and the tick loop.

use std::sync::Arc;

use autolabor_kinematics::{CommandState, Twist};
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::error::DriverError;

/// Single-slot mailbox: every publish overwrites, every fetch copies the newest command.
///
/// The lock is held only for the copy in or out, never across any math.
#[derive(Debug, Default)]
pub struct CommandIngress {
    slot: Mutex<CommandState>,
}

pub type SharedIngress = Arc<CommandIngress>;

impl CommandIngress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedIngress {
        Arc::new(Self::new())
    }

    /// Store `command` as the newest setpoint, stamped with `stamp` (s).
    ///
    /// Non-finite commands or stamps are refused and the previous command stays in place.
    pub fn publish(&self, command: Twist, stamp: f64) -> Result<(), DriverError> {
        if !command.is_finite() || !stamp.is_finite() {
            warn!(
                linear = command.linear,
                angular = command.angular,
                stamp,
                "Dropping malformed velocity command"
            );
            return Err(DriverError::MalformedCommand {
                linear: command.linear,
                angular: command.angular,
                stamp,
            });
        }
        *self.slot.lock() = CommandState::new(command, stamp);
        trace!(linear = command.linear, angular = command.angular, stamp, "Command stored");
        Ok(())
    }

    /// Copy of the newest command.
    pub fn fetch(&self) -> CommandState {
        *self.slot.lock()
    }

    /// Drop the stored command, leaving a zero command stamped at `now`.
    pub fn clear(&self, now: f64) {
        *self.slot.lock() = CommandState::new(Twist::ZERO, now);
        trace!(stamp = now, "Command cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_starts_with_zero_command() {
        let ingress = CommandIngress::new();
        assert_eq!(ingress.fetch(), CommandState::default());
    }

    #[test]
    fn test_latest_command_wins() {
        let ingress = CommandIngress::new();
        ingress.publish(Twist::new(0.1, 0.0), 1.0).unwrap();
        ingress.publish(Twist::new(0.2, 0.5), 1.1).unwrap();
        let state = ingress.fetch();
        assert_eq!(state.command, Twist::new(0.2, 0.5));
        assert_eq!(state.timestamp, 1.1);
    }

    #[test]
    fn test_malformed_command_keeps_previous() {
        let ingress = CommandIngress::new();
        ingress.publish(Twist::new(0.3, 0.0), 2.0).unwrap();
        let err = ingress.publish(Twist::new(f64::NAN, 0.0), 2.1).unwrap_err();
        assert!(matches!(err, DriverError::MalformedCommand { .. }));
        assert!(ingress.publish(Twist::new(0.0, 0.0), f64::INFINITY).is_err());
        assert_eq!(ingress.fetch(), CommandState::new(Twist::new(0.3, 0.0), 2.0));
    }

    #[test]
    fn test_clear_drops_the_command() {
        let ingress = CommandIngress::new();
        ingress.publish(Twist::new(1.0, 0.5), 10.0).unwrap();
        ingress.clear(0.0);
        assert_eq!(ingress.fetch(), CommandState::new(Twist::ZERO, 0.0));
    }

    #[test]
    fn test_concurrent_writers_never_tear() {
        let ingress = CommandIngress::shared();
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let ingress = Arc::clone(&ingress);
                thread::spawn(move || {
                    for i in 0..1_000 {
                        let v = (w * 1_000 + i) as f64;
                        ingress.publish(Twist::new(v, -v), v).unwrap();
                    }
                })
            })
            .collect();

        for _ in 0..1_000 {
            let state = ingress.fetch();
            assert_eq!(state.command.linear, -state.command.angular);
            assert_eq!(state.command.linear, state.timestamp);
        }
        for writer in writers {
            writer.join().unwrap();
        }
    }
}
