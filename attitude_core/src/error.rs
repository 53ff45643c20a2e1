// attitude_core/src/error.rs

use thiserror::Error;

use crate::alarms::AlarmStatus;
use crate::estimation::fusion::FusionPhase;
use crate::messages::SensorKind;

/// Why a task cycle did not commit a new estimate.
///
/// None of these are fatal. The task loop reports them through the alarm and
/// carries on with the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EstimatorError {
    /// A required sensor did not deliver within the failsafe window.
    #[error("{sensor} sample not delivered within the failsafe window")]
    SensorTimeout { sensor: SensorKind },

    /// The fusion estimator has not finished its staged initialization.
    #[error("fusion estimator not initialized (phase: {phase:?})")]
    NotInitialized { phase: FusionPhase },

    /// Outdoor fusion is running on too few satellites. The cycle still
    /// commits; only the alarm reflects it.
    #[error("only {satellites} satellites in view")]
    GeometryInsufficient { satellites: u8 },

    /// The configured fusion algorithm code is not one we implement.
    #[error("unsupported fusion algorithm code {0}")]
    UnsupportedMode(u8),
}

impl EstimatorError {
    /// The alarm level the rest of the system should see for this failure.
    pub fn alarm(&self) -> AlarmStatus {
        match self {
            EstimatorError::SensorTimeout { .. } => AlarmStatus::Warning,
            EstimatorError::NotInitialized { .. }
            | EstimatorError::GeometryInsufficient { .. }
            | EstimatorError::UnsupportedMode(_) => AlarmStatus::Error,
        }
    }
}

/// Failure of a sample source to produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvError {
    #[error("no sample within the requested timeout")]
    Timeout,
    #[error("sample source disconnected")]
    Disconnected,
}
