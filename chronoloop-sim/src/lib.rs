//! Closed-loop simulator for the chronoloop engine
//!
//! Runs a master and a slave client against each other over a simulated link,
//! with the slave disciplining a simulated oscillator. Everything runs in
//! simulated time, so a run is deterministic for a given seed.

pub mod clock;
pub mod config;
pub mod link;
pub mod simulation;

use tracing_log::AsLog;
use tracing_subscriber::filter::LevelFilter;

/// Route both `tracing` events and the engine's `log` records to stderr
pub fn setup_logger(level: LevelFilter) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init_with_filter(level.as_log())?;
    Ok(())
}
