//! Scripted velocity commands, published into the ingress from an async task
//! the way a teleop node would. When the script runs out the task goes silent
//! and the driver's command timeout takes over.

use std::time::Duration;

use autolabor_driver::SharedIngress;
use autolabor_driver::kinematics::Twist;
use tokio::sync::watch;
use tracing::info;

use crate::clock::{SimClock, period_from_rate};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub duration: Duration,
    pub command: Twist,
}

impl Segment {
    pub fn new(seconds: f64, linear: f64, angular: f64) -> Self {
        Segment {
            duration: Duration::from_secs_f64(seconds),
            command: Twist::new(linear, angular),
        }
    }
}

pub fn demo_script() -> Vec<Segment> {
    vec![
        Segment::new(3.0, 0.5, 0.0),
        Segment::new(3.0, 0.4, 0.6),
        Segment::new(2.0, 0.0, 1.0),
        Segment::new(1.5, -0.3, 0.0),
    ]
}

/// Index of the segment active `elapsed` after the script started, or `None` once it has ended.
pub fn segment_at(script: &[Segment], elapsed: Duration) -> Option<usize> {
    let mut end = Duration::ZERO;
    for (i, segment) in script.iter().enumerate() {
        end += segment.duration;
        if elapsed < end {
            return Some(i);
        }
    }
    None
}

pub async fn run_script(
    script: Vec<Segment>,
    ingress: SharedIngress,
    clock: SimClock,
    rate_hz: f64,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let period = period_from_rate(rate_hz).ok_or_else(|| {
        anyhow::anyhow!("command rate must give a positive period, got {rate_hz} Hz")
    })?;
    info!(segments = script.len(), rate_hz, "Command script started");

    let mut tick = tokio::time::interval(period);
    let start = tokio::time::Instant::now();
    let mut current = None;
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let Some(i) = segment_at(&script, start.elapsed()) else {
                    info!("Command script finished, going silent");
                    return Ok(());
                };
                let command = script[i].command;
                if current != Some(i) {
                    info!(segment = i, linear = command.linear, angular = command.angular, "Next command segment");
                    current = Some(i);
                }
                ingress.publish(command, clock.now())?;
            }
            _ = shutdown.changed() => {
                info!("Command script stopped");
                return Ok(());
            }
        }
    }
}
