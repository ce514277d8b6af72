//! Runs the relay against a simulated worker.
//!
//! Usage: `fixsim [config.yml]`. Set `RUST_LOG` to change verbosity.

mod sim;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::anyhow;
use fixrelay::Collaborators;
use fixrelay::Coordinator;
use fixrelay::Loader;
use fixrelay::LocationFix;
use fixrelay::MainExecutor;
use fixrelay::RelayConfig;
use tokio::runtime::Handle;
use tracing::info;

use crate::sim::SimBootstrap;
use crate::sim::SimHost;
use crate::sim::SimSettings;

const TICKS: u32 = 16;
const TICK: Duration = Duration::from_millis(250);

/// A walk around a small circle.
fn simulated_fix(tick: u32) -> LocationFix {
    let angle = f64::from(tick) * 0.4;
    let fix = LocationFix::new(52.5200 + 0.001 * angle.sin(), 13.4050 + 0.001 * angle.cos())
        .with_horizontal_accuracy(4.5)
        .with_speed(1.4)
        .with_course((f64::from(tick) * 23.0) % 360.0);
    // Only every other reading carries an altitude.
    if tick % 2 == 0 {
        fix.with_altitude(34.0).with_vertical_accuracy(3.0)
    } else {
        fix
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fixrelay::logging::init("info,fixrelay=debug");

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = RelayConfig::load_or_default(path.as_deref());
    info!(channel = %config.channel_name, "starting simulation");

    let rt = Handle::current();
    let executor = MainExecutor::spawn(config.executor_name.clone())?;
    let settings = Arc::new(SimSettings { logging_enabled: AtomicBool::new(false) });
    let coordinator = Coordinator::new(
        config.clone(),
        Collaborators {
            host: Arc::new(SimHost::new(config, rt.clone())),
            settings: settings.clone(),
            loader: Arc::new(Loader::new(Arc::new(SimBootstrap), rt.clone())),
            executor,
        },
        rt,
    );

    // A second source on a plain thread, like a platform sensor callback.
    let stop = Arc::new(AtomicBool::new(false));
    let source = {
        let coordinator = coordinator.clone();
        let stop = stop.clone();
        std::thread::Builder::new().name("fixsim-sensor".into()).spawn(move || {
            let mut tick = 100;
            while !stop.load(Ordering::Relaxed) {
                coordinator.submit(simulated_fix(tick));
                tick += 1;
                std::thread::sleep(Duration::from_millis(400));
            }
        })?
    };

    let mut interval = tokio::time::interval(TICK);
    for tick in 0..TICKS {
        interval.tick().await;
        coordinator.submit(simulated_fix(tick));

        if tick == TICKS / 2 {
            info!("soft reset");
            coordinator.cleanup();
            settings.logging_enabled.store(true, Ordering::Relaxed);
        }
    }

    stop.store(true, Ordering::Relaxed);
    source.join().map_err(|_| anyhow!("sensor thread panicked"))?;

    tokio::time::sleep(TICK).await;
    info!(status = ?coordinator.status(), "simulation finished");
    coordinator.force_cleanup();
    Ok(())
}
