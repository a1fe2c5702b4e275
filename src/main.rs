//! # hoplink-sim
//!
//! Runs the hoplink receiver link engine against a simulated transmitter
//! in real time, logging link statistics.
//!
//! Usage:
//! ```text
//! hoplink-sim [setup.toml]
//! ```
//!
//! Without a setup file the defaults are used. `RUST_LOG` selects the log
//! level, `HOPLINK_LOG_DIR` additionally enables daily log files.

use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use hoplink::config::Config;
use hoplink::sim::{self, LinkSim};
use hoplink::telemetry::StatsLogger;

/// Environment variable naming the log file directory
const LOG_DIR_ENV: &str = "HOPLINK_LOG_DIR";

/// Run time used when `sim.run_time_s` is 0 (until Ctrl+C)
const RUN_FOREVER_S: u64 = u32::MAX as u64;

/// Main entry point of the simulator
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up logging, optionally to daily rolling files
///    - Load and validate the setup
///    - Start the link engine and the simulated transmitter
///
/// 2. **Main Loop**
///    - Advance the simulation in 1 ms steps
///    - Log link statistics every `telemetry.log_interval_ms`, and write
///      them as JSONL when telemetry is enabled
///    - Handle Ctrl+C for graceful shutdown
///
/// # Errors
///
/// Returns error if the setup cannot be loaded, is invalid, or the engine
/// fails to start.
#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_logging(std::env::var(LOG_DIR_ENV).ok().as_deref());

    info!("hoplink-sim v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading setup from {}", path);
            Config::load(&path)?
        }
        None => Config::default(),
    };
    config.validate()?;

    let mut logger = if config.telemetry.enabled {
        Some(StatsLogger::new(&config.telemetry)?)
    } else {
        None
    };

    let mut sim = LinkSim::new(config.clone())?;
    info!(
        "Simulating {} Hz link, loss {}%, corruption {}%",
        sim.engine().link_config().frame_rate_hz,
        config.sim.loss_percent,
        config.sim.corrupt_percent
    );
    info!("Press Ctrl+C to exit");

    let run_time = run_duration(config.sim.run_time_s);
    let report_every = Duration::from_millis(config.telemetry.log_interval_ms);

    let result = tokio::select! {
        r = sim::run(&mut sim, run_time, report_every, |now, stats| {
            info!(
                "t={} ms connected={} lq={} rssi={}/{} ant={} tx_ant={}",
                now, stats.connected, stats.lq, stats.rssi1, stats.rssi2, stats.antenna, stats.transmit_antenna
            );
            if let Some(logger) = logger.as_mut() {
                if let Err(e) = logger.log(now, stats) {
                    warn!("Stats logging failed: {}", e);
                }
            }
        }) => r,

        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
    };

    if let Some(logger) = logger.as_mut() {
        logger.flush()?;
    }

    let engine = sim.engine();
    info!(
        "Ran {} ms: {} restarts, {} protocol faults, {} frames delivered, {} lost",
        sim.now_ms(),
        engine.restarts(),
        engine.faults(),
        sim.air().delivered(),
        sim.air().dropped()
    );

    result?;
    Ok(())
}

/// Install the tracing subscriber
///
/// # Returns
///
/// * `Option<WorkerGuard>` - Keeps the file writer alive, `None` for stdout
fn init_logging(log_dir: Option<&str>) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "hoplink-sim.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

/// Simulation length for `run_time_s`, 0 meaning until Ctrl+C
fn run_duration(run_time_s: u64) -> Duration {
    match run_time_s {
        0 => Duration::from_secs(RUN_FOREVER_S),
        s => Duration::from_secs(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_duration() {
        assert_eq!(run_duration(10), Duration::from_secs(10));
        assert_eq!(
            run_duration(0),
            Duration::from_secs(RUN_FOREVER_S),
            "Zero runs until interrupted"
        );
    }
}
