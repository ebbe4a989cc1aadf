use std::time::{Duration, Instant};

/// Monotonic seconds since startup, shared by the command side and the tick loop.
#[derive(Debug, Clone, Copy)]
pub struct SimClock {
    origin: Instant,
}

impl SimClock {
    pub fn start() -> Self {
        SimClock {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Period of a loop running at `hz`, or `None` if that is not a usable, non-zero duration.
pub fn period_from_rate(hz: f64) -> Option<Duration> {
    if !(hz.is_finite() && hz > 0.0) {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / hz)
        .ok()
        .filter(|period| !period.is_zero())
}
