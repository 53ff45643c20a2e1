// attitude_sim/src/simulation/config/structs.rs

use attitude_core::context::{AttitudeGains, Calibration, HomeLocation, Settings};
use attitude_core::types::{ArmedState, FusionMode};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use super::serde_helpers;

// =========================================================================
// == Top-Level Scenario ==
// =========================================================================

/// The root of a `scenario.toml` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)] // Fail if the TOML has fields not in our struct
pub struct ScenarioConfig {
    #[serde(default)]
    pub simulation: Simulation,

    /// The records the host configuration store starts with.
    #[serde(default)]
    pub estimator: EstimatorConfig,

    #[serde(default)]
    pub vehicle: VehicleConfig,

    #[serde(default)]
    pub sensors: SensorsConfig,

    /// `[[events]]`, applied in time order while the run progresses.
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

// =========================================================================
// == Sections ==
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Simulation {
    #[serde(default = "default_name")]
    pub name: String,
    /// Optional seed for the pseudo-random number generator for determinism.
    pub seed: Option<u64>,
    /// Simulated time in seconds, settle time included.
    pub duration_seconds: f64,
    /// Time the sensors run before the first estimator cycle.
    #[serde(default = "default_settle")]
    pub settle_seconds: f64,
}

fn default_name() -> String {
    "unnamed".to_string()
}

fn default_settle() -> f64 {
    0.1
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            name: default_name(),
            seed: None,
            duration_seconds: 10.0,
            settle_seconds: default_settle(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EstimatorConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub calibration: Calibration,
    #[serde(default)]
    pub home: HomeLocation,
    #[serde(default)]
    pub armed: ArmedState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VehicleConfig {
    #[serde(with = "serde_helpers::quat_from_rpy_deg", default = "level")]
    pub initial_attitude: UnitQuaternion<f64>,
    #[serde(with = "serde_helpers::vec3_from_array", default)]
    pub initial_position: Vector3<f64>,
    /// Motion script. The vehicle holds still once it runs out.
    #[serde(default)]
    pub segments: Vec<Segment>,
}

fn level() -> UnitQuaternion<f64> {
    UnitQuaternion::identity()
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            initial_attitude: level(),
            initial_position: Vector3::zeros(),
            segments: Vec::new(),
        }
    }
}

/// A span of constant body rate and constant NED velocity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Segment {
    pub duration_seconds: f64,
    /// Body rates in deg/s.
    #[serde(with = "serde_helpers::vec3_from_array", default)]
    pub body_rates_deg: Vector3<f64>,
    #[serde(with = "serde_helpers::vec3_from_array", default)]
    pub velocity_ned: Vector3<f64>,
}

// =========================================================================
// == Sensors ==
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorsConfig {
    /// The gyro rate also sets the estimator cycle rate.
    #[serde(default = "default_gyro")]
    pub gyro: VectorSensorConfig,
    #[serde(default = "default_accel")]
    pub accel: VectorSensorConfig,
    #[serde(default = "default_mag")]
    pub mag: VectorSensorConfig,
    #[serde(default)]
    pub baro: BaroConfig,
    #[serde(default)]
    pub gps: GpsConfig,
    /// Windows during which the gyro publishes nothing.
    #[serde(default)]
    pub gyro_dropouts: Vec<Window>,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            gyro: default_gyro(),
            accel: default_accel(),
            mag: default_mag(),
            baro: BaroConfig::default(),
            gps: GpsConfig::default(),
            gyro_dropouts: Vec::new(),
        }
    }
}

/// A three-axis sensor: truth plus a constant bias plus white noise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VectorSensorConfig {
    pub rate_hz: f64,
    #[serde(default)]
    pub noise_stddev: [f64; 3], // [x, y, z]
    #[serde(default)]
    pub bias: [f64; 3],
}

fn default_gyro() -> VectorSensorConfig {
    VectorSensorConfig {
        rate_hz: 500.0,
        noise_stddev: [0.002; 3],
        bias: [0.0; 3],
    }
}

fn default_accel() -> VectorSensorConfig {
    VectorSensorConfig {
        rate_hz: 500.0,
        noise_stddev: [0.05; 3],
        bias: [0.0; 3],
    }
}

fn default_mag() -> VectorSensorConfig {
    VectorSensorConfig {
        rate_hz: 50.0,
        noise_stddev: [2.0; 3],
        bias: [0.0; 3],
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaroConfig {
    pub rate_hz: f64,
    #[serde(default)]
    pub noise_stddev: f64,
}

impl Default for BaroConfig {
    fn default() -> Self {
        Self {
            rate_hz: 25.0,
            noise_stddev: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GpsConfig {
    #[serde(default)]
    pub enabled: bool,
    pub rate_hz: f64,
    pub satellites: u8,
    pub pdop: f64,
    /// Horizontal position noise in meters.
    #[serde(default)]
    pub position_noise_stddev: f64,
    /// Ground speed noise in m/s.
    #[serde(default)]
    pub velocity_noise_stddev: f64,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rate_hz: 5.0,
            satellites: 9,
            pdop: 1.5,
            position_noise_stddev: 0.5,
            velocity_noise_stddev: 0.05,
        }
    }
}

/// Half-open time window `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

impl Window {
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }
}

// =========================================================================
// == Events ==
// =========================================================================

/// Something that changes at `at_seconds`. Every field is optional; only the
/// ones present are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventConfig {
    pub at_seconds: f64,
    #[serde(default)]
    pub mode: Option<FusionMode>,
    /// Raw estimator code, for exercising codes no estimator implements.
    #[serde(default)]
    pub fusion_algorithm: Option<u8>,
    #[serde(default)]
    pub gains: Option<AttitudeGains>,
    #[serde(default)]
    pub calibration: Option<Calibration>,
    #[serde(default)]
    pub home: Option<HomeLocation>,
    #[serde(default)]
    pub armed: Option<ArmedState>,
    /// Number of satellites the GPS reports from now on.
    #[serde(default)]
    pub satellites: Option<u8>,
}

impl EventConfig {
    /// Whether the event touches the configuration store.
    pub fn changes_configuration(&self) -> bool {
        self.mode.is_some()
            || self.fusion_algorithm.is_some()
            || self.gains.is_some()
            || self.calibration.is_some()
            || self.home.is_some()
    }
}
