// attitude_core/src/lib.rs

// This file defines the public modules of the library.
pub mod alarms;
pub mod bus;
pub mod context;
pub mod error;
pub mod estimation;
pub mod frames;
pub mod messages;
pub mod models;
pub mod prelude;
pub mod task;
pub mod types;
pub mod utils;
