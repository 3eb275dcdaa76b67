//! # Minidrone Demo
//!
//! Flies a short scripted sequence against the in-process simulated drone.
//!
//! ```text
//! minidrone [config.toml]
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`). When `logging.dir` is
//! set, logs go to a daily rotated file in that directory instead of stdout.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use minidrone::config::Config;
use minidrone::controller::{MoveDirection, TurnDirection};
use minidrone::drone::Drone;
use minidrone::engine::types::{FlipDirection, Model};
use minidrone::transport::sim::SimulatedDrone;

/// Name advertised by the simulated drone
const DEMO_DRONE_NAME: &str = "Mambo_612345";

/// Duration of each scripted move
const DEMO_MOVE_DURATION: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            Config::load(&path).with_context(|| format!("failed to load config from {}", path))?
        }
        None => Config::default(),
    };

    let _guard = init_logging(&config);

    info!("Minidrone v{} starting...", env!("CARGO_PKG_VERSION"));

    let sim = Arc::new(
        SimulatedDrone::new(DEMO_DRONE_NAME, Model::Mambo)
            .with_battery(80)
            .with_grabber(1),
    );
    let drone = Drone::start(sim.clone(), config);
    sim.link_up();

    info!("Press Ctrl+C to exit");

    tokio::select! {
        result = fly(&drone) => {
            result.context("demo flight failed")?;
            info!("Demo flight complete ({} piloting commands sent)", sim.pcmd_count());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    drone.disconnect().await?;
    Ok(())
}

/// Install the tracing subscriber
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for the whole run.
fn init_logging(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    if config.logging.dir.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.logging.dir, "minidrone.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

/// Scripted flight
async fn fly(drone: &Drone) -> minidrone::Result<()> {
    drone.wait_connected().await?;

    let state = drone.snapshot();
    if let Some(identity) = &state.identity {
        info!("Connected to {} ({})", identity.name, identity.model);
    }
    if let Some(percent) = state.battery.percent {
        info!("Battery at {}%", percent);
    }

    drone.take_off().await?;
    info!("Airborne");

    drone
        .move_toward(MoveDirection::Forward, DEMO_MOVE_DURATION)
        .await?;
    drone.turn(TurnDirection::Right, 90).await?;
    drone.move_toward(MoveDirection::Up, DEMO_MOVE_DURATION).await?;

    if let Err(e) = drone.flip(FlipDirection::Back).await {
        warn!("Skipping flip: {}", e);
    }

    drone.open_grabber().await?;
    drone.close_grabber().await?;
    drone.take_picture().await?;

    drone.land().await?;
    info!("Landed");
    Ok(())
}
