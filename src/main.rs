mod blackboard; // shared simulation snapshot
mod clock;
mod plant; // stand-in wheel motors and world
mod teleop; // scripted command source

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, anyhow};
use autolabor_driver::{
    CommandIngress, DEFAULT_CONFIG_PATH, DriverConfig, DriverOutputs, FourWheelDiffDriver,
    OdometryRecord, SharedIngress, load_config,
};
use config::{Config, ConfigError};
use serde::Deserialize;
use spin_sleep::SpinSleeper;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{self, EnvFilter};

use blackboard::{Blackboard, record_cycle, snapshot};
use clock::{SimClock, period_from_rate};
use plant::WheelPlant;

/// Table in the configuration file holding [`SimConfig`].
const SIM_SECTION: &str = "sim";

/// Knobs for the simulated surroundings of the driver.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct SimConfig {
    /// How often the tick thread calls the driver (Hz).
    tick_hz: f64,
    /// Wall-clock length of the run (s).
    run_seconds: f64,
    /// First-order time constant of the simulated wheel motors (s).
    plant_time_constant: f64,
    /// How often the command script publishes (Hz).
    command_hz: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            tick_hz: 200.0,
            run_seconds: 12.0,
            plant_time_constant: 0.05,
            command_hz: 20.0,
        }
    }
}

impl SimConfig {
    fn from_config(settings: &Config) -> anyhow::Result<Self> {
        let sim = match settings.get::<SimConfig>(SIM_SECTION) {
            Ok(sim) => sim,
            Err(ConfigError::NotFound(_)) => SimConfig::default(),
            Err(e) => return Err(e).context("reading [sim] table"),
        };
        anyhow::ensure!(
            period_from_rate(sim.tick_hz).is_some(),
            "sim.tick_hz must give a positive period"
        );
        anyhow::ensure!(
            period_from_rate(sim.command_hz).is_some(),
            "sim.command_hz must give a positive period"
        );
        anyhow::ensure!(
            Duration::try_from_secs_f64(sim.run_seconds).is_ok(),
            "sim.run_seconds must be a finite, non-negative duration"
        );
        Ok(sim)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let settings =
        load_config(&path).with_context(|| format!("loading configuration from {path}"))?;
    let driver_config = DriverConfig::from_config(&settings).context("reading [driver] table")?;
    let sim = SimConfig::from_config(&settings)?;
    info!(?sim, "Autolabor simulation starting");

    let clock = SimClock::start();
    let ingress = CommandIngress::shared();
    let outputs = DriverOutputs::default();
    let odom_rx = outputs.odometry.subscribe();
    let driver =
        FourWheelDiffDriver::new(&driver_config, Arc::clone(&ingress), outputs, clock.now())
            .context("drive configuration rejected")?;
    let plant = WheelPlant::new(*driver.drive(), sim.plant_time_constant);

    let bb: Blackboard = Arc::default();
    let running = Arc::new(AtomicBool::new(true));

    info!("Spawning drive tick thread...");
    let tick_thread = std::thread::Builder::new()
        .name("drive-tick".into())
        .spawn({
            let bb = Arc::clone(&bb);
            let running = Arc::clone(&running);
            let period = period_from_rate(sim.tick_hz)
                .ok_or_else(|| anyhow!("sim.tick_hz must give a positive period"))?;
            move || tick_loop(driver, plant, clock, period, bb, running)
        })?;

    let tokio_rt = tokio::runtime::Runtime::new()?;
    let result = tokio_rt.block_on(async_runtime(
        sim,
        ingress,
        clock,
        odom_rx,
        Arc::clone(&bb),
    ));

    running.store(false, Ordering::Relaxed);
    tick_thread
        .join()
        .map_err(|_| anyhow!("drive tick thread panicked"))?;
    if let Err(e) = &result {
        error!("Simulation tasks failed: {:?}", e);
    }
    result?;

    let state = snapshot(&bb);
    let drift = ((state.estimate.x - state.truth.x).powi(2)
        + (state.estimate.y - state.truth.y).powi(2))
    .sqrt();
    info!(
        cycles = state.cycles,
        stale_cycles = state.stale_cycles,
        estimate = %state.estimate,
        truth = %state.truth,
        drift,
        "Simulation finished"
    );
    Ok(())
}

/// Drive the controller from a dedicated thread, stepping the plant between ticks.
fn tick_loop(
    mut driver: FourWheelDiffDriver,
    mut plant: WheelPlant,
    clock: SimClock,
    period: Duration,
    bb: Blackboard,
    running: Arc<AtomicBool>,
) {
    info!(?period, "Drive tick thread started.");
    let sleeper = SpinSleeper::new(100_000);
    let mut last = clock.now();
    while running.load(Ordering::Relaxed) {
        let now = clock.now();
        plant.step(now - last);
        last = now;
        if let Some(cycle) = driver.update(now, &plant.measured(), Some(plant.truth())) {
            plant.set_targets(cycle.joint_targets);
            record_cycle(&bb, &cycle, plant.truth());
        }
        sleeper.sleep(period);
    }
    info!(pose = %driver.pose(), "Drive tick thread stopped.");
}

async fn async_runtime(
    sim: SimConfig,
    ingress: SharedIngress,
    clock: SimClock,
    odom_rx: broadcast::Receiver<Arc<OdometryRecord>>,
    bb: Blackboard,
) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let script = tokio::spawn(teleop::run_script(
        teleop::demo_script(),
        ingress,
        clock,
        sim.command_hz,
        shutdown_rx.clone(),
    ));
    let monitor = tokio::spawn(odometry_monitor(odom_rx, bb, shutdown_rx));

    tokio::time::sleep(Duration::from_secs_f64(sim.run_seconds)).await;
    // Receivers may already be gone if both tasks ended early.
    let _ = shutdown_tx.send(true);

    script.await??;
    monitor.await??;
    Ok(())
}

/// Log the odometry stream about once per second of robot time.
async fn odometry_monitor(
    mut odom_rx: broadcast::Receiver<Arc<OdometryRecord>>,
    bb: Blackboard,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    info!("Odometry monitor started.");
    let mut next_report = 0.0;
    loop {
        tokio::select! {
            msg = odom_rx.recv() => match msg {
                Ok(odom) => {
                    if odom.stamp >= next_report {
                        let state = snapshot(&bb);
                        info!(
                            %odom,
                            truth = %state.truth,
                            command_stale = state.command_stale,
                            "Odometry"
                        );
                        next_report = odom.stamp + 1.0;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Odometry monitor lagging behind the drive loop");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    info!("Odometry monitor stopped.");
    Ok(())
}
