// attitude_core/src/estimation/filters/mod.rs

pub mod ekf;
