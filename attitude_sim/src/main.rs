// attitude_sim/src/main.rs

//! Headless run of one scenario.
//!
//! `cargo run -p attitude_sim -- --scenario assets/scenarios/outdoor.toml`

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use attitude_sim::cli::{Cli, DEFAULT_LOG_FILTER};
use attitude_sim::simulation::config::load_scenario;
use attitude_sim::{run_scenario, SimError};

fn main() -> Result<(), SimError> {
    let cli = Cli::parse();

    // --- 1. Logging: --log, then RUST_LOG, then the default filter ---
    let filter = match &cli.log {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // --- 2. Load and run ---
    let scenario = load_scenario(&cli.scenario)?;
    let summary = run_scenario(&scenario, &cli.run_options())?;
    summary.log();

    // --- 3. Optional summary file ---
    if let Some(path) = &cli.summary {
        std::fs::write(path, toml::to_string_pretty(&summary)?)?;
        info!("Run summary written to {}", path.display());
    }
    Ok(())
}
