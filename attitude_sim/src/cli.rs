// attitude_sim/src/cli.rs

use attitude_core::types::FusionMode;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::simulation::runner::RunOptions;

/// Default tracing filter when neither `--log` nor `RUST_LOG` is given.
pub const DEFAULT_LOG_FILTER: &str = "info,attitude_core=debug";

/// Runs the attitude estimator task against a simulated vehicle.
///
/// This struct defines the command-line arguments of the `attitude_sim`
/// binary.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(short, long, default_value = "assets/scenarios/indoor.toml")]
    pub scenario: PathBuf,

    /// Simulated seconds to run, overriding the scenario.
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Estimator to run, overriding the scenario settings.
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Seed for the sensor noise, overriding the scenario.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Pace the simulation against the wall clock.
    #[arg(long, default_value_t = false)]
    pub realtime: bool,

    /// Tracing filter, e.g. `info,attitude_core=trace`.
    #[arg(long)]
    pub log: Option<String>,

    /// Write the run summary as TOML to this path.
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Complementary,
    FusionIndoor,
    FusionOutdoor,
}

impl From<ModeArg> for FusionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Complementary => FusionMode::Complementary,
            ModeArg::FusionIndoor => FusionMode::FusionIndoor,
            ModeArg::FusionOutdoor => FusionMode::FusionOutdoor,
        }
    }
}

impl Cli {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            duration_seconds: self.duration,
            mode: self.mode.map(Into::into),
            seed: self.seed,
            realtime: self.realtime,
        }
    }
}
