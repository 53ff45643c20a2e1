// attitude_core/src/task.rs

//! The estimator task: one cycle per gyro sample.
//!
//! The host owns the loop and calls [`AttitudeTask::run_cycle`] back to back;
//! the gyro wait inside the cycle sets the pace.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::alarms::{AlarmReporter, AlarmStatus, AlarmSubsystem};
use crate::bus::{FlightStatusSource, MonotonicClock, SampleSource, TelemetrySink, Watchdog};
use crate::context::ConfigHandle;
use crate::error::{EstimatorError, RecvError};
use crate::estimation::{ActiveEstimator, AttitudeEstimator, Estimate, Freshness, SensorFrame};
use crate::messages::{
    AccelSample, AttitudeState, BaroSample, GpsSample, GyroBias, GyroSample, MagSample, SensorKind,
};

/// Longest wait for a gyro sample before the cycle is abandoned.
pub const GYRO_TIMEOUT: Duration = Duration::from_millis(10);

/// The five sensor feeds the task reads.
pub struct SensorFeeds {
    pub gyro: Box<dyn SampleSource<GyroSample>>,
    pub accel: Box<dyn SampleSource<AccelSample>>,
    pub mag: Box<dyn SampleSource<MagSample>>,
    pub baro: Box<dyn SampleSource<BaroSample>>,
    pub gps: Box<dyn SampleSource<GpsSample>>,
}

/// Latest slow-sensor samples, kept across cycles.
#[derive(Debug, Clone, Copy, Default)]
struct SampleCache {
    mag: Option<MagSample>,
    baro: Option<BaroSample>,
    gps: Option<GpsSample>,
}

/// Counters over the lifetime of the task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStats {
    pub cycles: u64,
    pub published: u64,
    pub sensor_timeouts: u64,
    pub not_initialized: u64,
    pub unsupported_mode: u64,
    pub mode_switches: u64,
}

impl CycleStats {
    fn record(&mut self, result: &Result<(), EstimatorError>) {
        self.cycles += 1;
        match result {
            Ok(()) => self.published += 1,
            Err(EstimatorError::SensorTimeout { .. }) => self.sensor_timeouts += 1,
            Err(EstimatorError::NotInitialized { .. }) => self.not_initialized += 1,
            Err(EstimatorError::UnsupportedMode(_)) => self.unsupported_mode += 1,
            Err(EstimatorError::GeometryInsufficient { .. }) => {}
        }
    }
}

pub struct AttitudeTask<S: TelemetrySink> {
    feeds: SensorFeeds,
    config: ConfigHandle,
    clock: Box<dyn MonotonicClock>,
    flight_status: Box<dyn FlightStatusSource>,
    sink: S,
    watchdog: Box<dyn Watchdog>,

    estimator: Option<ActiveEstimator>,
    /// Raw mode code seen by the previous cycle, supported or not.
    last_mode: Option<u8>,
    applied_generation: Option<u64>,
    cache: SampleCache,
    last_cycle: Duration,
    attitude: AttitudeState,
    gyro_bias: GyroBias,
    alarm: AlarmReporter,
    stats: CycleStats,
}

impl<S: TelemetrySink> AttitudeTask<S> {
    pub fn new(
        feeds: SensorFeeds,
        config: ConfigHandle,
        clock: Box<dyn MonotonicClock>,
        flight_status: Box<dyn FlightStatusSource>,
        sink: S,
        watchdog: Box<dyn Watchdog>,
    ) -> Self {
        Self {
            feeds,
            config,
            clock,
            flight_status,
            sink,
            watchdog,
            estimator: None,
            last_mode: None,
            applied_generation: None,
            cache: SampleCache::default(),
            last_cycle: Duration::ZERO,
            attitude: AttitudeState::default(),
            gyro_bias: GyroBias::default(),
            alarm: AlarmReporter::new(AlarmSubsystem::Attitude),
            stats: CycleStats::default(),
        }
    }

    /// Publishes the power-on defaults: identity attitude, zero bias and a
    /// clear alarm.
    pub fn start(&mut self) {
        self.attitude = AttitudeState::default();
        self.gyro_bias = GyroBias::default();
        self.sink.set_attitude(&self.attitude);
        self.sink.set_gyro_bias(&self.gyro_bias);
        self.alarm.report(AlarmStatus::Clear, &mut self.sink);
        info!("attitude task started");
    }

    /// One iteration of the task loop. The watchdog is fed whatever happens.
    pub fn run_cycle(&mut self) -> Result<(), EstimatorError> {
        let result = self.step();
        self.stats.record(&result);
        self.watchdog.feed();
        result
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    pub fn attitude(&self) -> &AttitudeState {
        &self.attitude
    }

    pub fn gyro_bias(&self) -> &GyroBias {
        &self.gyro_bias
    }

    pub fn alarm(&self) -> AlarmStatus {
        self.alarm.current()
    }

    pub fn estimator(&self) -> Option<&ActiveEstimator> {
        self.estimator.as_ref()
    }

    fn step(&mut self) -> Result<(), EstimatorError> {
        // --- 1. Synchronize on the sensors ---
        let gyro = match self.feeds.gyro.receive(GYRO_TIMEOUT) {
            Ok(sample) => sample,
            Err(err) => return Err(self.sensor_timeout(SensorKind::Gyro, err)),
        };
        let accel = match self.feeds.accel.receive(Duration::ZERO) {
            Ok(sample) => sample,
            Err(err) => return Err(self.sensor_timeout(SensorKind::Accel, err)),
        };

        let mut fresh = Freshness::default();
        if let Ok(sample) = self.feeds.mag.receive(Duration::ZERO) {
            self.cache.mag = Some(sample);
            fresh.mag = true;
        }
        if let Ok(sample) = self.feeds.baro.receive(Duration::ZERO) {
            self.cache.baro = Some(sample);
            fresh.baro = true;
        }
        if let Ok(sample) = self.feeds.gps.receive(Duration::ZERO) {
            self.cache.gps = Some(sample);
            fresh.gps = true;
        }

        // --- 2. Configuration and mode ---
        let ctx = self.config.snapshot();
        let code = ctx.settings.fusion_algorithm;
        let first_run = self.last_mode != Some(code);
        if first_run && self.last_mode.is_some() {
            self.stats.mode_switches += 1;
        }
        self.last_mode = Some(code);

        let mode = match ctx.mode() {
            Ok(mode) => mode,
            Err(err) => {
                if first_run {
                    warn!(%err, "no estimator for the configured mode");
                }
                self.estimator = None;
                self.alarm.report(err.alarm(), &mut self.sink);
                return Err(err);
            }
        };

        if first_run {
            let previous = self.estimator.as_ref().map(ActiveEstimator::mode);
            info!(%mode, ?previous, "attitude estimator selected");
            self.estimator = Some(ActiveEstimator::build(
                mode,
                self.last_cycle,
                self.attitude.orientation,
            ));
        }
        let Some(estimator) = self.estimator.as_mut() else {
            return Err(EstimatorError::UnsupportedMode(code));
        };

        if self.applied_generation != Some(ctx.generation) {
            estimator.apply_configuration(&ctx);
            self.applied_generation = Some(ctx.generation);
            // Only the complementary filter runs on the configured offset.
            if let ActiveEstimator::Complementary(filter) = &*estimator {
                self.gyro_bias = GyroBias(*filter.gyro_bias());
                self.sink.set_gyro_bias(&self.gyro_bias);
            }
        }

        // --- 3. Estimate ---
        let frame = SensorFrame {
            now: self.clock.now(),
            gyro,
            accel,
            mag: self.cache.mag,
            baro: self.cache.baro,
            gps: self.cache.gps,
            fresh,
            armed: self.flight_status.armed(),
        };
        self.last_cycle = frame.now;

        let result = estimator.update(&frame, &ctx);
        let status = estimator.alarm();
        let result = result.map(|estimate| self.publish(&estimate));
        self.alarm.report(status, &mut self.sink);
        result
    }

    fn publish(&mut self, estimate: &Estimate) {
        self.attitude = estimate.attitude;
        self.gyro_bias = estimate.gyro_bias;
        self.sink.set_attitude(&self.attitude);
        self.sink.set_gyro_bias(&self.gyro_bias);
        if let Some(nav) = &estimate.navigation {
            self.sink.set_position(&nav.position);
            self.sink.set_velocity(&nav.velocity);
        }
        if let Some(ned) = &estimate.ned_debug {
            self.sink.set_ned_debug(ned);
        }
    }

    fn sensor_timeout(&mut self, sensor: SensorKind, cause: RecvError) -> EstimatorError {
        if cause == RecvError::Disconnected {
            // Keep the loop period bounded even with no producer attached.
            std::thread::sleep(GYRO_TIMEOUT);
        }
        let err = EstimatorError::SensorTimeout { sensor };
        debug!(%err, ?cause, "cycle skipped");
        self.alarm.report(err.alarm(), &mut self.sink);
        err
    }
}
