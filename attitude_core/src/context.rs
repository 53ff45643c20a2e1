// attitude_core/src/context.rs

//! The configuration the estimators read every cycle.
//!
//! The host owns three records (`Settings`, `Calibration`, `HomeLocation`).
//! Whenever one of them changes the host calls [`ConfigHandle::notify_changed`]
//! (or [`ConfigHandle::apply`]), which re-reads all three, derives the
//! constants the estimators need and publishes the result as one immutable
//! [`ConfigurationContext`]. The task takes a snapshot at the top of each cycle
//! and never observes a half-applied update.

use std::sync::{Arc, PoisonError, RwLock};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bus::ConfigSource;
use crate::error::EstimatorError;
use crate::frames::ned::NedConverter;
use crate::messages::GyroBias;
use crate::types::FusionMode;

// =========================================================================
// == Host Records ==
// =========================================================================

/// Proportional/integral gains of the complementary filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttitudeGains {
    pub accel_kp: f64,
    pub accel_ki: f64,
    pub yaw_bias_rate: f64,
}

impl AttitudeGains {
    /// High gains used while the filter is still converging after boot.
    pub const BOOTSTRAP: AttitudeGains = AttitudeGains {
        accel_kp: 1.0,
        accel_ki: 0.9,
        yaw_bias_rate: 0.23,
    };
}

impl Default for AttitudeGains {
    fn default() -> Self {
        Self {
            accel_kp: 0.05,
            accel_ki: 0.0001,
            yaw_bias_rate: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Raw estimator code as stored by the host (0, 1 or 2). Kept raw so an
    /// unknown value can be reported instead of rejected at load time.
    pub fusion_algorithm: u8,
    pub gains: AttitudeGains,
    /// Use bootstrap gains while the vehicle is arming.
    pub zero_during_arming: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fusion_algorithm: FusionMode::Complementary.code(),
            gains: AttitudeGains::default(),
            zero_during_arming: true,
        }
    }
}

impl Settings {
    pub fn mode(&self) -> Result<FusionMode, EstimatorError> {
        FusionMode::try_from(self.fusion_algorithm)
    }
}

/// Sensor noise variances and the stored gyro bias offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// (rad/s)² per axis.
    pub gyro_var: Vector3<f64>,
    /// (m/s²)² per axis.
    pub accel_var: Vector3<f64>,
    /// Normalized-field variance per axis.
    pub mag_var: Vector3<f64>,
    /// m².
    pub baro_var: f64,
    /// Bias (rad/s) the gyro estimate starts from after each configuration
    /// change.
    pub gyro_bias_offset: Vector3<f64>,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            gyro_var: Vector3::repeat(1e-5),
            accel_var: Vector3::repeat(3e-3),
            mag_var: Vector3::repeat(5e-3),
            baro_var: 0.1,
            gyro_bias_offset: Vector3::zeros(),
        }
    }
}

/// Reference point for the local NED frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeLocation {
    /// Degrees × 1e7.
    pub latitude: i32,
    /// Degrees × 1e7.
    pub longitude: i32,
    /// Meters above mean sea level.
    pub altitude: f64,
    /// Earth magnetic field at home, NED.
    pub be: Vector3<f64>,
    pub set: bool,
}

// =========================================================================
// == Derived Context ==
// =========================================================================

/// Measurement and process variances handed to the fusion filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterVariances {
    pub gyro: Vector3<f64>,
    pub accel: Vector3<f64>,
    pub mag: Vector3<f64>,
    pub baro: f64,
    pub gps_position: f64,
    pub gps_velocity: f64,
}

/// GPS horizontal position and velocity variance.
pub const GPS_VARIANCE: f64 = 1e-2;

impl FilterVariances {
    pub fn from_calibration(calibration: &Calibration) -> Self {
        Self {
            gyro: calibration.gyro_var,
            accel: calibration.accel_var,
            mag: calibration.mag_var,
            baro: calibration.baro_var,
            gps_position: GPS_VARIANCE,
            gps_velocity: GPS_VARIANCE,
        }
    }
}

/// One consistent view of the configuration plus everything derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationContext {
    pub settings: Settings,
    pub calibration: Calibration,
    pub home: HomeLocation,
    pub converter: NedConverter,
    pub variances: FilterVariances,
    pub bias_offset: GyroBias,
    /// Incremented on every apply; lets the task notice a new configuration.
    pub generation: u64,
}

impl ConfigurationContext {
    pub fn new(
        settings: Settings,
        calibration: Calibration,
        home: HomeLocation,
        generation: u64,
    ) -> Self {
        Self {
            converter: NedConverter::from_home(&home),
            variances: FilterVariances::from_calibration(&calibration),
            bias_offset: GyroBias(calibration.gyro_bias_offset),
            settings,
            calibration,
            home,
            generation,
        }
    }

    pub fn mode(&self) -> Result<FusionMode, EstimatorError> {
        self.settings.mode()
    }
}

impl Default for ConfigurationContext {
    fn default() -> Self {
        Self::new(
            Settings::default(),
            Calibration::default(),
            HomeLocation::default(),
            0,
        )
    }
}

/// Shared, atomically replaced configuration. Clones refer to the same slot.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<ConfigurationContext>>>,
}

impl ConfigHandle {
    pub fn new(settings: Settings, calibration: Calibration, home: HomeLocation) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(ConfigurationContext::new(
                settings,
                calibration,
                home,
                0,
            )))),
        }
    }

    /// The configuration in effect right now. The returned context never
    /// changes; a later apply publishes a new one.
    pub fn snapshot(&self) -> Arc<ConfigurationContext> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the whole configuration and recomputes derived constants.
    pub fn apply(&self, settings: Settings, calibration: Calibration, home: HomeLocation) {
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let generation = slot.generation + 1;
        *slot = Arc::new(ConfigurationContext::new(
            settings,
            calibration,
            home,
            generation,
        ));
        info!(
            generation,
            fusion_algorithm = settings.fusion_algorithm,
            home_set = home.set,
            "configuration applied"
        );
    }

    /// Change notification: re-reads every record from `source`.
    pub fn notify_changed(&self, source: &dyn ConfigSource) {
        self.apply(
            source.settings(),
            source.calibration(),
            source.home_location(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticSource {
        settings: Settings,
        home: HomeLocation,
    }

    impl ConfigSource for StaticSource {
        fn settings(&self) -> Settings {
            self.settings
        }
        fn calibration(&self) -> Calibration {
            Calibration {
                gyro_bias_offset: Vector3::new(0.01, 0.0, -0.02),
                ..Default::default()
            }
        }
        fn home_location(&self) -> HomeLocation {
            self.home
        }
    }

    #[test]
    fn defaults_select_complementary() {
        let ctx = ConfigurationContext::default();
        assert_eq!(ctx.mode(), Ok(FusionMode::Complementary));
        assert_eq!(ctx.generation, 0);
        assert_eq!(ctx.variances.gps_position, GPS_VARIANCE);
        assert!(!ctx.home.set);
    }

    #[test]
    fn apply_publishes_a_new_generation() {
        let handle = ConfigHandle::default();
        let before = handle.snapshot();

        let source = StaticSource {
            settings: Settings {
                fusion_algorithm: 2,
                ..Default::default()
            },
            home: HomeLocation {
                latitude: 450_000_000,
                altitude: 100.0,
                set: true,
                ..Default::default()
            },
        };
        handle.notify_changed(&source);

        let after = handle.snapshot();
        assert_eq!(after.generation, 1);
        assert_eq!(after.mode(), Ok(FusionMode::FusionOutdoor));
        assert_eq!(after.converter, NedConverter::from_home(&source.home));
        assert_eq!(after.bias_offset.0, Vector3::new(0.01, 0.0, -0.02));

        // Snapshots taken earlier are untouched.
        assert_eq!(before.generation, 0);
        assert_eq!(before.mode(), Ok(FusionMode::Complementary));
    }

    #[test]
    fn clones_share_the_slot() {
        let handle = ConfigHandle::default();
        let host_side = handle.clone();
        host_side.apply(
            Settings {
                fusion_algorithm: 9,
                ..Default::default()
            },
            Calibration::default(),
            HomeLocation::default(),
        );
        let ctx = handle.snapshot();
        assert_eq!(ctx.generation, 1);
        assert_eq!(ctx.mode(), Err(EstimatorError::UnsupportedMode(9)));
    }
}
