// attitude_sim/src/error.rs

use attitude_core::messages::SensorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("failed to load scenario: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("the {0} feed has no receiver")]
    FeedClosed(SensorKind),

    #[error("failed to serialize the run summary: {0}")]
    Summary(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
