// attitude_core/src/types.rs

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::EstimatorError;

// --- Core Type Aliases ---
pub type State = DVector<f64>;
pub type Control = DVector<f64>;

/// The estimator selected by the `Settings::fusion_algorithm` code.
///
/// The numeric codes match the values the host configuration store writes, so
/// an unknown code can be detected (and alarmed) instead of silently mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FusionMode {
    /// Gyro integration corrected by accel/mag vector errors. Attitude only.
    Complementary,
    /// Prediction/correction fusion without GPS; horizontal drift is weakly
    /// pulled toward the origin.
    FusionIndoor,
    /// Prediction/correction fusion aided by GPS horizontal position/velocity.
    FusionOutdoor,
}

impl FusionMode {
    pub const fn code(self) -> u8 {
        match self {
            FusionMode::Complementary => 0,
            FusionMode::FusionIndoor => 1,
            FusionMode::FusionOutdoor => 2,
        }
    }
}

impl TryFrom<u8> for FusionMode {
    type Error = EstimatorError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(FusionMode::Complementary),
            1 => Ok(FusionMode::FusionIndoor),
            2 => Ok(FusionMode::FusionOutdoor),
            other => Err(EstimatorError::UnsupportedMode(other)),
        }
    }
}

impl std::fmt::Display for FusionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FusionMode::Complementary => "complementary",
            FusionMode::FusionIndoor => "fusion-indoor",
            FusionMode::FusionOutdoor => "fusion-outdoor",
        };
        f.write_str(name)
    }
}

/// Arming state reported by the flight-status object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArmedState {
    #[default]
    Disarmed,
    Arming,
    Armed,
}
