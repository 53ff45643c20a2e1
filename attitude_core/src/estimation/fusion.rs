// attitude_core/src/estimation/fusion.rs

//! Prediction/correction estimator over the 16-state INS vector.
//!
//! The estimator goes through a staged start: it waits until every sensor it
//! needs has been seen, seeds the state from them, runs a few prediction-only
//! steps and only then starts publishing.

use std::collections::HashMap;
use std::time::Duration;

use nalgebra::{DMatrix, DVector, UnitQuaternion, Vector3};
use tracing::{debug, info, warn};

use crate::alarms::AlarmStatus;
use crate::context::{ConfigurationContext, FilterVariances, HomeLocation};
use crate::error::EstimatorError;
use crate::estimation::filters::ekf::ExtendedKalmanFilter;
use crate::estimation::{AttitudeEstimator, Estimate, Freshness, SensorFrame};
use crate::frames::layout::{
    ACCEL_BIAS_IDX, GYRO_BIAS_IDX, INITIAL_COVARIANCE_DIAGONAL, STANDARD_INS_STATE_DIM,
    standard_ins_state_layout,
};
use crate::frames::rotation::{canonicalize, rpy_degrees};
use crate::frames::FilterState;
use crate::messages::{AttitudeState, GpsSample, GyroBias, NavigationState};
use crate::models::estimation::dynamics::integrated_imu::IntegratedImuModel;
use crate::models::estimation::measurement::barometer::BarometerModel;
use crate::models::estimation::measurement::gps::HorizontalModel;
use crate::models::estimation::measurement::magnetometer::MagnetometerModel;
use crate::models::estimation::measurement::{Measurement, MeasurementSource};

// --- Staging ---
pub const STAGING_CYCLES: u8 = 10;
/// Fixed prediction step used while staging, seconds.
pub const STAGING_DT: f64 = 0.002;

// --- Running ---
pub const MIN_DT: f64 = 0.001;
pub const MAX_DT: f64 = 0.01;
/// A gyro bias state beyond this on any axis (rad/s) is considered diverged.
pub const MAX_GYRO_BIAS: f64 = 0.1;

// --- GPS quality ---
pub const MIN_SATELLITES: u8 = 7;
pub const MAX_PDOP: f64 = 4.0;

// --- Indoor anchor ---
pub const INDOOR_POSITION_VAR: f64 = 10.0;
pub const INDOOR_VELOCITY_VAR: f64 = 1.0;

// Bias random walk, per second.
const GYRO_BIAS_WALK: f64 = 1e-9;
const ACCEL_BIAS_WALK: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionPhase {
    Uninitialized,
    /// Number of staging cycles completed.
    Staging(u8),
    Running,
}

/// Whether a fix is good enough to be fused.
pub fn gps_qualifies(gps: &GpsSample, home: &HomeLocation) -> bool {
    gps.satellites >= MIN_SATELLITES && gps.pdop <= MAX_PDOP && home.set
}

pub fn clamp_dt(raw: f64) -> f64 {
    raw.clamp(MIN_DT, MAX_DT)
}

/// Attitude from a single accelerometer and magnetometer reading: roll and
/// pitch from gravity, yaw from the tilt-compensated horizontal field.
pub fn initial_orientation(
    accel: &Vector3<f64>,
    field: &Vector3<f64>,
    be: &Vector3<f64>,
) -> UnitQuaternion<f64> {
    let roll = (-accel.y).atan2(-accel.z);
    let pitch = accel.x.atan2((accel.y * accel.y + accel.z * accel.z).sqrt());
    let level = UnitQuaternion::from_euler_angles(roll, pitch, 0.0) * field;
    let yaw = be.y.atan2(be.x) - level.y.atan2(level.x);
    UnitQuaternion::from_euler_angles(roll, pitch, yaw)
}

#[derive(Debug)]
pub struct FusionEstimator {
    outdoor: bool,
    phase: FusionPhase,
    /// Sensors seen since the last reset while not running; this cycle's
    /// arrivals once running.
    seen: Freshness,
    filter: ExtendedKalmanFilter,
    last_time: Duration,
    last_dt: f64,
    alarm: AlarmStatus,
    applied_generation: Option<u64>,
}

impl FusionEstimator {
    pub fn new(outdoor: bool) -> Self {
        let variances = FilterVariances::from_calibration(&Default::default());
        Self {
            outdoor,
            phase: FusionPhase::Uninitialized,
            seen: Freshness::default(),
            filter: build_filter(&variances, &Vector3::zeros()),
            last_time: Duration::ZERO,
            last_dt: 0.0,
            alarm: AlarmStatus::Error,
            applied_generation: None,
        }
    }

    pub fn phase(&self) -> FusionPhase {
        self.phase
    }

    /// The clamped step used by the last running cycle.
    pub fn last_dt(&self) -> f64 {
        self.last_dt
    }

    pub fn state(&self) -> &FilterState {
        self.filter.state()
    }

    /// Overwrites the gyro bias state. Used to inject faults.
    pub fn set_gyro_bias_state(&mut self, bias: &Vector3<f64>) {
        self.filter.state_mut().set_gyro_bias(bias);
    }

    fn evaluate_alarm(&self, frame: &SensorFrame) -> AlarmStatus {
        let satellites = frame.gps.map_or(0, |gps| gps.satellites);
        if self.phase != FusionPhase::Running {
            AlarmStatus::Error
        } else if self.outdoor && satellites < MIN_SATELLITES {
            debug!(
                "{}",
                EstimatorError::GeometryInsufficient { satellites }
            );
            AlarmStatus::Error
        } else {
            AlarmStatus::Clear
        }
    }

    fn stage(&mut self, frame: &SensorFrame, ctx: &ConfigurationContext) {
        let ready = self.seen.mag && self.seen.baro && (self.seen.gps || !self.outdoor);
        if !ready {
            return;
        }

        match self.phase {
            FusionPhase::Uninitialized => {
                if self.initialize(frame, ctx) {
                    self.phase = FusionPhase::Staging(1);
                }
            }
            FusionPhase::Staging(done) => {
                let u = IntegratedImuModel::control(&frame.accel.accel, &frame.gyro.rate);
                self.filter.predict(&u, STAGING_DT);
                let done = done + 1;
                if done >= STAGING_CYCLES {
                    self.phase = FusionPhase::Running;
                    info!(outdoor = self.outdoor, "fusion estimator running");
                } else {
                    self.phase = FusionPhase::Staging(done);
                    debug!(done, "fusion staging");
                }
            }
            FusionPhase::Running => {}
        }
        self.last_time = frame.now;
    }

    /// Resets state and covariance from the current samples.
    fn initialize(&mut self, frame: &SensorFrame, ctx: &ConfigurationContext) -> bool {
        let (Some(mag), Some(baro)) = (frame.mag, frame.baro) else {
            return false;
        };
        let position = if self.outdoor {
            match frame.gps {
                Some(gps) => ctx.converter.to_ned(&gps),
                None => return false,
            }
        } else {
            Vector3::new(0.0, 0.0, -baro.altitude)
        };
        let orientation = initial_orientation(&frame.accel.accel, &mag.field, &ctx.home.be);

        let mut state = FilterState::new(standard_ins_state_layout(), &INITIAL_COVARIANCE_DIAGONAL);
        state.set_position(&position);
        state.set_orientation(&orientation);
        *self.filter.state_mut() = state;

        let rpy = rpy_degrees(&orientation);
        info!(
            roll = rpy.x,
            pitch = rpy.y,
            yaw = rpy.z,
            north = position.x,
            east = position.y,
            down = position.z,
            "fusion estimator initialized"
        );
        true
    }

    fn run(&mut self, frame: &SensorFrame, ctx: &ConfigurationContext) -> Estimate {
        let dt = clamp_dt(frame.now.saturating_sub(self.last_time).as_secs_f64());
        self.last_time = frame.now;
        self.last_dt = dt;

        let u = IntegratedImuModel::control(&frame.accel.accel, &frame.gyro.rate);
        self.filter.predict(&u, dt);

        // --- Measurement mask ---
        let mut measurements: Vec<(MeasurementSource, DVector<f64>)> = Vec::with_capacity(4);
        if self.seen.mag && ctx.home.set {
            match frame.mag.and_then(|mag| MagnetometerModel::measurement(&mag.field)) {
                Some(z) => measurements.push((MeasurementSource::Magnetometer, z)),
                None => debug!("magnetometer reading has no direction, skipped"),
            }
        }
        if self.seen.baro || !self.outdoor {
            if let Some(baro) = frame.baro {
                measurements.push((
                    MeasurementSource::Barometer,
                    DVector::from_element(1, baro.altitude),
                ));
            }
        }

        let mut ned_debug = None;
        if self.outdoor {
            if let Some(gps) = frame.gps.filter(|_| self.seen.gps) {
                let ned = ctx.converter.to_ned(&gps);
                let vel = gps.velocity_ned();
                measurements.push((
                    MeasurementSource::Gps,
                    DVector::from_row_slice(&[ned.x, ned.y, vel.x, vel.y]),
                ));
                ned_debug = Some(ned);
            }
        } else {
            measurements.push((MeasurementSource::IndoorAnchor, DVector::zeros(4)));
        }

        self.filter.correct(&measurements);

        let bias = self.filter.state().gyro_bias();
        if bias.iter().any(|b| b.abs() > MAX_GYRO_BIAS) {
            warn!(?bias, "gyro bias state diverged, reset to zero");
            self.filter.state_mut().set_gyro_bias(&Vector3::zeros());
        }

        let state = self.filter.state();
        let published = UnitQuaternion::new_unchecked(canonicalize(state.raw_quaternion()));
        Estimate {
            attitude: AttitudeState::from_orientation(published),
            gyro_bias: GyroBias(state.gyro_bias()),
            navigation: Some(NavigationState {
                position: state.position(),
                velocity: state.velocity(),
            }),
            ned_debug,
        }
    }
}

impl AttitudeEstimator for FusionEstimator {
    fn update(
        &mut self,
        frame: &SensorFrame,
        ctx: &ConfigurationContext,
    ) -> Result<Estimate, EstimatorError> {
        if self.applied_generation != Some(ctx.generation) {
            self.apply_configuration(ctx);
        }

        let qualifies = frame
            .gps
            .is_some_and(|gps| gps_qualifies(&gps, &ctx.home));
        if self.phase == FusionPhase::Running {
            self.seen = Freshness::default();
        }
        self.seen.mag |= frame.fresh.mag;
        self.seen.baro |= frame.fresh.baro;
        self.seen.gps = (self.seen.gps || (frame.fresh.gps && self.outdoor)) && qualifies;

        self.alarm = self.evaluate_alarm(frame);

        match self.phase {
            FusionPhase::Running => Ok(self.run(frame, ctx)),
            phase => {
                self.stage(frame, ctx);
                Err(EstimatorError::NotInitialized { phase })
            }
        }
    }

    fn alarm(&self) -> AlarmStatus {
        self.alarm
    }

    fn apply_configuration(&mut self, ctx: &ConfigurationContext) {
        configure_filter(&mut self.filter, &ctx.variances, &ctx.home.be);
        self.applied_generation = Some(ctx.generation);
        debug!(generation = ctx.generation, "fusion variances updated");
    }
}

fn control_noise(variances: &FilterVariances) -> DMatrix<f64> {
    let (a, g) = (&variances.accel, &variances.gyro);
    DMatrix::from_diagonal(&DVector::from_row_slice(&[a.x, a.y, a.z, g.x, g.y, g.z]))
}

fn random_walk() -> DMatrix<f64> {
    let mut diagonal = DVector::zeros(STANDARD_INS_STATE_DIM);
    diagonal.fixed_rows_mut::<3>(GYRO_BIAS_IDX).fill(GYRO_BIAS_WALK);
    diagonal.fixed_rows_mut::<3>(ACCEL_BIAS_IDX).fill(ACCEL_BIAS_WALK);
    DMatrix::from_diagonal(&diagonal)
}

fn build_filter(variances: &FilterVariances, be: &Vector3<f64>) -> ExtendedKalmanFilter {
    let mut filter = ExtendedKalmanFilter::new(
        FilterState::new(standard_ins_state_layout(), &INITIAL_COVARIANCE_DIAGONAL),
        Box::new(IntegratedImuModel::default()),
        control_noise(variances),
        random_walk(),
        HashMap::new(),
    );
    filter.set_measurement_model(
        MeasurementSource::IndoorAnchor,
        Box::new(HorizontalModel::new(INDOOR_POSITION_VAR, INDOOR_VELOCITY_VAR)),
    );
    configure_filter(&mut filter, variances, be);
    filter
}

fn configure_filter(filter: &mut ExtendedKalmanFilter, variances: &FilterVariances, be: &Vector3<f64>) {
    filter.set_control_noise(control_noise(variances));
    let models: [(MeasurementSource, Box<dyn Measurement>); 3] = [
        (
            MeasurementSource::Magnetometer,
            Box::new(MagnetometerModel::new(be, &variances.mag)),
        ),
        (
            MeasurementSource::Barometer,
            Box::new(BarometerModel::new(variances.baro)),
        ),
        (
            MeasurementSource::Gps,
            Box::new(HorizontalModel::new(
                variances.gps_position,
                variances.gps_velocity,
            )),
        ),
    ];
    for (source, model) in models {
        filter.set_measurement_model(source, model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::testing::*;
    use crate::types::FusionMode;
    use approx::assert_abs_diff_eq;

    const STEP: Duration = Duration::from_millis(2);

    /// Feeds level frames until staging completes.
    fn run_to_running(
        estimator: &mut FusionEstimator,
        ctx: &ConfigurationContext,
        t: &mut Duration,
    ) {
        for _ in 0..STAGING_CYCLES {
            *t += STEP;
            let _ = estimator.update(&level_frame(*t), ctx);
        }
        assert_eq!(estimator.phase(), FusionPhase::Running);
    }

    #[test]
    fn indoor_staging_reaches_running_on_the_tenth_cycle() {
        let ctx = context(FusionMode::FusionIndoor);
        let mut estimator = FusionEstimator::new(false);
        let mut t = Duration::ZERO;

        for cycle in 1..=STAGING_CYCLES {
            t += STEP;
            let result = estimator.update(&level_frame(t), &ctx);
            assert!(matches!(result, Err(EstimatorError::NotInitialized { .. })));
            assert_eq!(estimator.alarm(), AlarmStatus::Error);
            if cycle < STAGING_CYCLES {
                assert_eq!(estimator.phase(), FusionPhase::Staging(cycle));
            }
        }
        assert_eq!(estimator.phase(), FusionPhase::Running);

        t += STEP;
        let estimate = estimator.update(&level_frame(t), &ctx).unwrap();
        assert_eq!(estimator.alarm(), AlarmStatus::Clear);
        assert!(estimate.navigation.is_some());
        assert!(estimate.ned_debug.is_none());
    }

    #[test]
    fn staging_waits_until_every_sensor_was_seen() {
        let ctx = context(FusionMode::FusionIndoor);
        let mut estimator = FusionEstimator::new(false);

        let mut frame = level_frame(STEP);
        frame.fresh.mag = false;
        assert!(estimator.update(&frame, &ctx).is_err());
        assert_eq!(estimator.phase(), FusionPhase::Uninitialized);

        // Baro was seen last cycle; the flag accumulates.
        let mut frame = level_frame(STEP * 2);
        frame.fresh.baro = false;
        assert!(estimator.update(&frame, &ctx).is_err());
        assert_eq!(estimator.phase(), FusionPhase::Staging(1));
    }

    #[test]
    fn outdoor_with_five_satellites_holds_error() {
        let ctx = context(FusionMode::FusionOutdoor);
        let mut estimator = FusionEstimator::new(true);
        let mut t = Duration::ZERO;
        for _ in 0..30 {
            t += STEP;
            let mut frame = level_frame(t);
            frame.gps = Some(gps_at_home(5));
            assert!(estimator.update(&frame, &ctx).is_err());
            assert_eq!(estimator.alarm(), AlarmStatus::Error);
        }
        assert_eq!(estimator.phase(), FusionPhase::Uninitialized);
    }

    #[test]
    fn losing_satellites_while_running_raises_error_but_publishes() {
        let ctx = context(FusionMode::FusionOutdoor);
        let mut estimator = FusionEstimator::new(true);
        let mut t = Duration::ZERO;
        run_to_running(&mut estimator, &ctx, &mut t);

        t += STEP;
        let estimate = estimator.update(&level_frame(t), &ctx).unwrap();
        assert_eq!(estimator.alarm(), AlarmStatus::Clear);
        assert_eq!(estimate.ned_debug, Some(Vector3::zeros()));

        for _ in 0..5 {
            t += STEP;
            let mut frame = level_frame(t);
            frame.gps = Some(gps_at_home(5));
            let estimate = estimator.update(&frame, &ctx).unwrap();
            assert_eq!(estimator.alarm(), AlarmStatus::Error);
            assert!(estimate.ned_debug.is_none());
        }
    }

    #[test]
    fn running_dt_is_clamped() {
        let ctx = context(FusionMode::FusionIndoor);
        let mut estimator = FusionEstimator::new(false);
        let mut t = Duration::ZERO;
        run_to_running(&mut estimator, &ctx, &mut t);

        for (delta, expected) in [(0.0, 0.001), (0.0001, 0.001), (0.5, 0.01), (10.0, 0.01)] {
            t += Duration::from_secs_f64(delta);
            estimator.update(&level_frame(t), &ctx).unwrap();
            assert_eq!(estimator.last_dt(), expected);
        }
    }

    #[test]
    fn diverged_gyro_bias_is_zeroed() {
        let ctx = context(FusionMode::FusionIndoor);
        let mut estimator = FusionEstimator::new(false);
        let mut t = Duration::ZERO;
        run_to_running(&mut estimator, &ctx, &mut t);

        estimator.set_gyro_bias_state(&Vector3::new(0.15, 0.0, 0.0));
        t += STEP;
        let estimate = estimator.update(&level_frame(t), &ctx).unwrap();
        assert_eq!(estimate.gyro_bias.0, Vector3::zeros());
        assert_eq!(estimator.state().gyro_bias(), Vector3::zeros());
    }

    #[test]
    fn stationary_indoor_vehicle_stays_level_and_home() {
        let ctx = context(FusionMode::FusionIndoor);
        let mut estimator = FusionEstimator::new(false);
        let mut t = Duration::ZERO;
        run_to_running(&mut estimator, &ctx, &mut t);

        for _ in 0..500 {
            t += STEP;
            let estimate = estimator.update(&level_frame(t), &ctx).unwrap();
            let q = estimate.attitude.quaternion();
            let norm = q.iter().map(|c| c * c).sum::<f64>().sqrt();
            assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-5);
        }
        let state = estimator.state();
        let rpy = rpy_degrees(&state.orientation());
        assert!(rpy.norm() < 0.5, "attitude drifted: {rpy:?}");
        assert!(state.position().norm() < 0.5);
        assert!(state.velocity().norm() < 0.1);
    }

    #[test]
    fn initial_orientation_recovers_attitude() {
        let truth = UnitQuaternion::from_euler_angles(0.3, -0.2, 1.1);
        let frame = frame_at(Duration::ZERO, &truth);
        let mag = frame.mag.map(|m| m.field).unwrap_or_default();
        let estimate = initial_orientation(&frame.accel.accel, &mag, &be());
        assert_abs_diff_eq!(estimate.angle_to(&truth), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn gps_quality_gate() {
        let home = home();
        assert!(gps_qualifies(&gps_at_home(7), &home));
        assert!(!gps_qualifies(&gps_at_home(6), &home));
        let mut poor = gps_at_home(12);
        poor.pdop = 4.5;
        assert!(!gps_qualifies(&poor, &home));
        let unset = HomeLocation {
            set: false,
            ..home
        };
        assert!(!gps_qualifies(&gps_at_home(12), &unset));
    }

    #[test]
    fn new_configuration_does_not_restart_staging() {
        let mut ctx = context(FusionMode::FusionIndoor);
        let mut estimator = FusionEstimator::new(false);
        let mut t = Duration::ZERO;
        run_to_running(&mut estimator, &ctx, &mut t);

        ctx.calibration.mag_var = Vector3::repeat(1e-1);
        ctx.variances = FilterVariances::from_calibration(&ctx.calibration);
        ctx.generation += 1;
        t += STEP;
        assert!(estimator.update(&level_frame(t), &ctx).is_ok());
        assert_eq!(estimator.phase(), FusionPhase::Running);
    }
}
