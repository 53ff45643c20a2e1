// attitude_sim/src/prelude.rs

// Re-export the entire attitude_core prelude so you can easily access
// pure types like `Settings`, `AttitudeTask`, `FusionMode`, etc.
pub use attitude_core::prelude::*;

// Re-export common simulation-specific types for easy access.
pub use crate::error::SimError;
pub use crate::simulation::config::structs::*;
pub use crate::simulation::config::{load_scenario, parse_scenario};
pub use crate::simulation::runner::{run_scenario, RunOptions, RunSummary};
pub use crate::simulation::store::ObjectStore;
