//! Fixed-period update gating.
//!
//! The driving loop ticks at whatever rate the simulation or sensor delivers.
//! [`UpdateScheduler`] turns that stream of timestamps into updates that fire
//! once at least one update period has elapsed, and reports the *actual*
//! elapsed time so integration stays honest when ticks jitter.

/// Slack absorbed when comparing elapsed time with the period, so ticks that
/// land exactly on a period boundary are not lost to rounding.
const PERIOD_TOLERANCE: f64 = 1e-9;

/// Outcome of feeding one timestamp to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Not enough time has passed; nothing to do.
    Idle,
    /// An update is due; `dt` is the time since the previous update.
    Due {
        /// Seconds since the last fired update.
        dt: f64,
    },
    /// The clock went backwards. The scheduler has rebased on the new time.
    Rewound,
    /// The timestamp was NaN or infinite and was ignored.
    Malformed,
}

/// Two-state (idle/due) gate on an externally supplied clock.
#[derive(Debug, Clone)]
pub struct UpdateScheduler {
    update_period: f64,
    last_update_time: f64,
}

impl UpdateScheduler {
    /// Construct a scheduler with an explicit period (s), anchored at `start_time`.
    ///
    /// A non-positive (or NaN) period means "fire on every tick".
    pub fn new(update_period: f64, start_time: f64) -> Self {
        let update_period = if update_period > 0.0 {
            update_period
        } else {
            0.0
        };
        UpdateScheduler {
            update_period,
            last_update_time: start_time,
        }
    }

    /// Construct a scheduler from a rate in Hz. `update_rate <= 0` disables throttling.
    pub fn from_rate(update_rate: f64, start_time: f64) -> Self {
        let period = if update_rate > 0.0 {
            1.0 / update_rate
        } else {
            0.0
        };
        UpdateScheduler::new(period, start_time)
    }

    /// The effective update period (s); zero when unthrottled.
    pub fn update_period(&self) -> f64 {
        self.update_period
    }

    /// Time of the last fired update.
    pub fn last_update_time(&self) -> f64 {
        self.last_update_time
    }

    /// Returns `true` when every tick fires.
    pub fn is_unthrottled(&self) -> bool {
        self.update_period == 0.0
    }

    /// Re-anchor the scheduler at `now` without firing.
    pub fn reset(&mut self, now: f64) {
        self.last_update_time = now;
    }

    /// Feed the current time.
    pub fn tick(&mut self, now: f64) -> Tick {
        if !now.is_finite() {
            return Tick::Malformed;
        }
        let elapsed = now - self.last_update_time;
        if elapsed < 0.0 {
            self.last_update_time = now;
            return Tick::Rewound;
        }
        if self.is_unthrottled() || elapsed + PERIOD_TOLERANCE >= self.update_period {
            self.last_update_time = now;
            Tick::Due { dt: elapsed }
        } else {
            Tick::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_throttles_to_every_fourth_tick() {
        let mut scheduler = UpdateScheduler::new(0.1, 0.0);
        let mut fired = Vec::new();
        for i in 1..=12 {
            let now = i as f64 * 0.03;
            if let Tick::Due { dt } = scheduler.tick(now) {
                fired.push((i, dt));
            }
        }
        assert_eq!(fired.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![4, 8, 12]);
        for (_, dt) in fired {
            assert!((dt - 0.12).abs() < EPSILON, "dt {dt} should be the real elapsed time");
        }
    }

    #[test]
    fn test_fires_on_exact_period_boundaries() {
        let mut scheduler = UpdateScheduler::from_rate(10.0, 0.0);
        let fired = (1..=10)
            .filter(|i| matches!(scheduler.tick(*i as f64 * 0.1), Tick::Due { .. }))
            .count();
        assert_eq!(fired, 10);
    }

    #[test]
    fn test_non_positive_period_fires_every_tick() {
        for mut scheduler in [
            UpdateScheduler::new(0.0, 0.0),
            UpdateScheduler::new(-1.0, 0.0),
            UpdateScheduler::from_rate(0.0, 0.0),
            UpdateScheduler::from_rate(-5.0, 0.0),
        ] {
            assert!(scheduler.is_unthrottled());
            assert_eq!(scheduler.tick(0.001), Tick::Due { dt: 0.001 });
            // A repeated timestamp still fires, with zero elapsed time.
            assert_eq!(scheduler.tick(0.001), Tick::Due { dt: 0.0 });
        }
    }

    #[test]
    fn test_idle_until_period_elapsed() {
        let mut scheduler = UpdateScheduler::new(0.5, 2.0);
        assert_eq!(scheduler.tick(2.2), Tick::Idle);
        assert_eq!(scheduler.tick(2.4), Tick::Idle);
        assert!(matches!(scheduler.tick(2.6), Tick::Due { .. }));
        assert!((scheduler.last_update_time() - 2.6).abs() < EPSILON);
    }

    #[test]
    fn test_backwards_time_rebases() {
        let mut scheduler = UpdateScheduler::new(0.1, 5.0);
        assert_eq!(scheduler.tick(1.0), Tick::Rewound);
        assert_eq!(scheduler.last_update_time(), 1.0);
        assert_eq!(scheduler.tick(1.05), Tick::Idle);
        assert!(matches!(scheduler.tick(1.1), Tick::Due { .. }));
    }

    #[test]
    fn test_malformed_time_is_ignored() {
        let mut scheduler = UpdateScheduler::new(0.1, 0.0);
        assert_eq!(scheduler.tick(f64::NAN), Tick::Malformed);
        assert_eq!(scheduler.tick(f64::INFINITY), Tick::Malformed);
        assert_eq!(scheduler.last_update_time(), 0.0);
        assert!(matches!(scheduler.tick(0.2), Tick::Due { .. }));
    }
}
