// attitude_core/src/estimation/mod.rs

use std::time::Duration;

use nalgebra::{UnitQuaternion, Vector3};

use crate::alarms::AlarmStatus;
use crate::context::ConfigurationContext;
use crate::error::EstimatorError;
use crate::messages::{
    AccelSample, AttitudeState, BaroSample, GpsSample, GyroBias, GyroSample, MagSample,
    NavigationState,
};
use crate::types::{ArmedState, FusionMode};

pub mod complementary;
pub mod filters;
pub mod fusion;

use complementary::ComplementaryFilter;
use fusion::FusionEstimator;

/// Which of the slow sensors delivered a new sample this cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Freshness {
    pub mag: bool,
    pub baro: bool,
    pub gps: bool,
}

/// Everything an estimator sees in one cycle.
///
/// `mag`, `baro` and `gps` hold the latest sample ever received (they are
/// `None` until the first one arrives); `fresh` says whether it arrived this
/// cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorFrame {
    /// Monotonic time since boot.
    pub now: Duration,
    pub gyro: GyroSample,
    pub accel: AccelSample,
    pub mag: Option<MagSample>,
    pub baro: Option<BaroSample>,
    pub gps: Option<GpsSample>,
    pub fresh: Freshness,
    pub armed: ArmedState,
}

impl SensorFrame {
    pub fn fresh_mag(&self) -> Option<&MagSample> {
        self.mag.as_ref().filter(|_| self.fresh.mag)
    }

    pub fn fresh_gps(&self) -> Option<&GpsSample> {
        self.gps.as_ref().filter(|_| self.fresh.gps)
    }
}

/// The outputs of one successful cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub attitude: AttitudeState,
    pub gyro_bias: GyroBias,
    pub navigation: Option<NavigationState>,
    /// Raw GPS-derived NED position, when a fix was used this cycle.
    pub ned_debug: Option<Vector3<f64>>,
}

/// The contract shared by both estimators.
pub trait AttitudeEstimator: Send {
    /// Runs one cycle. On `Err` nothing must be published.
    fn update(
        &mut self,
        frame: &SensorFrame,
        ctx: &ConfigurationContext,
    ) -> Result<Estimate, EstimatorError>;

    /// Alarm level after the last `update`.
    fn alarm(&self) -> AlarmStatus;

    /// Picks up a newly applied configuration without reinitializing.
    fn apply_configuration(&mut self, ctx: &ConfigurationContext);
}

/// The estimator selected by the current mode. Switching modes builds a new
/// variant; nothing carries over except what the caller seeds.
#[derive(Debug)]
pub enum ActiveEstimator {
    Complementary(ComplementaryFilter),
    FusionIndoor(FusionEstimator),
    FusionOutdoor(FusionEstimator),
}

impl ActiveEstimator {
    /// Builds the estimator for `mode`. The complementary filter continues
    /// from the last published attitude; the fusion estimator always restarts
    /// its staged initialization. Neither carries a gyro bias over: a mode
    /// change always comes with a new configuration, and applying it sets the
    /// bias.
    pub fn build(mode: FusionMode, last_cycle: Duration, attitude: UnitQuaternion<f64>) -> Self {
        match mode {
            FusionMode::Complementary => {
                ActiveEstimator::Complementary(ComplementaryFilter::new(last_cycle, attitude))
            }
            FusionMode::FusionIndoor => ActiveEstimator::FusionIndoor(FusionEstimator::new(false)),
            FusionMode::FusionOutdoor => ActiveEstimator::FusionOutdoor(FusionEstimator::new(true)),
        }
    }

    pub fn mode(&self) -> FusionMode {
        match self {
            ActiveEstimator::Complementary(_) => FusionMode::Complementary,
            ActiveEstimator::FusionIndoor(_) => FusionMode::FusionIndoor,
            ActiveEstimator::FusionOutdoor(_) => FusionMode::FusionOutdoor,
        }
    }

    fn inner(&mut self) -> &mut dyn AttitudeEstimator {
        match self {
            ActiveEstimator::Complementary(filter) => filter,
            ActiveEstimator::FusionIndoor(fusion) | ActiveEstimator::FusionOutdoor(fusion) => {
                fusion
            }
        }
    }
}

impl AttitudeEstimator for ActiveEstimator {
    fn update(
        &mut self,
        frame: &SensorFrame,
        ctx: &ConfigurationContext,
    ) -> Result<Estimate, EstimatorError> {
        self.inner().update(frame, ctx)
    }

    fn alarm(&self) -> AlarmStatus {
        match self {
            ActiveEstimator::Complementary(filter) => filter.alarm(),
            ActiveEstimator::FusionIndoor(fusion) | ActiveEstimator::FusionOutdoor(fusion) => {
                fusion.alarm()
            }
        }
    }

    fn apply_configuration(&mut self, ctx: &ConfigurationContext) {
        self.inner().apply_configuration(ctx)
    }
}

/// Frame and configuration builders shared by the estimator tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::context::{Calibration, HomeLocation, Settings};
    use crate::models::estimation::dynamics::integrated_imu::GRAVITY;

    pub fn be() -> Vector3<f64> {
        Vector3::new(200.0, 0.0, 400.0)
    }

    pub fn home() -> HomeLocation {
        HomeLocation {
            latitude: 473_977_420,
            longitude: 85_455_940,
            altitude: 488.0,
            be: be(),
            set: true,
        }
    }

    pub fn context(mode: FusionMode) -> ConfigurationContext {
        ConfigurationContext::new(
            Settings {
                fusion_algorithm: mode.code(),
                ..Default::default()
            },
            Calibration::default(),
            home(),
            1,
        )
    }

    pub fn gps_at_home(satellites: u8) -> GpsSample {
        let home = home();
        GpsSample {
            satellites,
            pdop: 1.5,
            latitude: home.latitude,
            longitude: home.longitude,
            altitude: home.altitude,
            ..Default::default()
        }
    }

    /// A level, stationary vehicle facing north with every sensor fresh.
    pub fn level_frame(now: Duration) -> SensorFrame {
        SensorFrame {
            now,
            gyro: GyroSample::default(),
            accel: AccelSample {
                accel: Vector3::new(0.0, 0.0, -GRAVITY),
            },
            mag: Some(MagSample { field: be() }),
            baro: Some(BaroSample { altitude: 0.0 }),
            gps: Some(gps_at_home(9)),
            fresh: Freshness {
                mag: true,
                baro: true,
                gps: true,
            },
            armed: ArmedState::Disarmed,
        }
    }

    /// The same vehicle seen by sensors while it sits at `orientation`.
    pub fn frame_at(now: Duration, orientation: &UnitQuaternion<f64>) -> SensorFrame {
        let mut frame = level_frame(now);
        let to_body = orientation.inverse();
        frame.accel.accel = to_body * Vector3::new(0.0, 0.0, -GRAVITY);
        frame.mag = Some(MagSample {
            field: to_body * be(),
        });
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn build_selects_the_matching_variant() {
        for mode in [
            FusionMode::Complementary,
            FusionMode::FusionIndoor,
            FusionMode::FusionOutdoor,
        ] {
            let estimator =
                ActiveEstimator::build(mode, Duration::ZERO, UnitQuaternion::identity());
            assert_eq!(estimator.mode(), mode);
        }
    }

    #[test]
    fn freshness_gates_the_fresh_accessors() {
        let mut frame = level_frame(Duration::from_millis(5));
        assert!(frame.fresh_mag().is_some());
        frame.fresh = Freshness::default();
        assert!(frame.fresh_mag().is_none());
        assert!(frame.fresh_gps().is_none());
        assert!(frame.mag.is_some());
    }

    #[test]
    fn dispatch_reaches_the_inner_estimator() {
        let ctx = context(FusionMode::FusionIndoor);
        let mut estimator = ActiveEstimator::build(
            FusionMode::FusionIndoor,
            Duration::ZERO,
            UnitQuaternion::identity(),
        );
        let result = estimator.update(&level_frame(Duration::from_millis(2)), &ctx);
        assert!(matches!(
            result,
            Err(EstimatorError::NotInitialized { .. })
        ));
        assert_eq!(estimator.alarm(), AlarmStatus::Error);
    }
}
