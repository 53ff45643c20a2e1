// attitude_sim/src/lib.rs

// This prelude is for convenience for other files WITHIN the attitude_sim crate.
pub mod prelude;

pub mod cli;
pub mod error;
// This module contains all the simulation-specific logic.
pub mod simulation;

pub use error::SimError;
pub use simulation::runner::{run_scenario, RunOptions, RunSummary};
