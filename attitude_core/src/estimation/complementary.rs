// attitude_core/src/estimation/complementary.rs

//! Gyro integration corrected by the gravity and magnetic field directions.
//!
//! The accelerometer error drives roll/pitch (and some yaw when tilted); the
//! magnetometer error only drives yaw. Both errors feed a proportional rate
//! correction and an integral that accumulates into the gyro bias.

use std::time::Duration;

use nalgebra::{UnitQuaternion, Vector3};
use tracing::{debug, info, warn};

use crate::alarms::AlarmStatus;
use crate::context::{AttitudeGains, ConfigurationContext, Settings};
use crate::error::EstimatorError;
use crate::estimation::{AttitudeEstimator, Estimate, SensorFrame};
use crate::frames::rotation::{canonicalize, integrate_body_rate, normalize_or_identity};
use crate::messages::{AttitudeState, GyroBias, NavigationState};
use crate::types::ArmedState;

/// Fixed magnetometer gains.
pub const MAG_KP: f64 = 1e-4;
pub const MAG_KI: f64 = 1e-6;

/// Bootstrap gains apply strictly between these times after boot.
pub const BOOTSTRAP_START: Duration = Duration::from_secs(1);
pub const BOOTSTRAP_END: Duration = Duration::from_secs(7);

/// Stored gains are tuned against rates in deg/s.
const GAIN_SCALE: f64 = std::f64::consts::PI / 180.0;

/// Vector magnitudes below this carry no usable direction.
const MIN_FIELD_MAGNITUDE: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct ComplementaryFilter {
    orientation: UnitQuaternion<f64>,
    /// Rate correction accumulated by the integral terms, rad/s. Added to the
    /// measured rate before integration.
    gyro_bias: Vector3<f64>,
    last_time: Duration,
    /// Set once the configured gains have been loaded after the bootstrap
    /// window; cleared again while arming.
    settled: bool,
    gains: AttitudeGains,
    alarm: AlarmStatus,
}

impl ComplementaryFilter {
    /// `last_time` is the time of the previous cycle (zero at boot). The bias
    /// starts at zero until a configuration is applied.
    pub fn new(last_time: Duration, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            orientation,
            gyro_bias: Vector3::zeros(),
            last_time,
            settled: false,
            gains: AttitudeGains::default(),
            alarm: AlarmStatus::Clear,
        }
    }

    pub fn orientation(&self) -> &UnitQuaternion<f64> {
        &self.orientation
    }

    pub fn gyro_bias(&self) -> &Vector3<f64> {
        &self.gyro_bias
    }

    /// Gains used by the last cycle.
    pub fn gains(&self) -> &AttitudeGains {
        &self.gains
    }

    fn schedule_gains(&mut self, now: Duration, armed: ArmedState, settings: &Settings) {
        let in_window = now > BOOTSTRAP_START && now < BOOTSTRAP_END;
        if !self.settled && in_window {
            self.gains = AttitudeGains::BOOTSTRAP;
        } else if settings.zero_during_arming && armed == ArmedState::Arming {
            if self.settled {
                debug!("arming, switching to bootstrap gains");
            }
            self.gains = AttitudeGains::BOOTSTRAP;
            self.settled = false;
        } else {
            if !self.settled && now >= BOOTSTRAP_END {
                self.settled = true;
                info!(
                    accel_kp = settings.gains.accel_kp,
                    accel_ki = settings.gains.accel_ki,
                    yaw_bias_rate = settings.gains.yaw_bias_rate,
                    "complementary filter settled, loading configured gains"
                );
            }
            self.gains = settings.gains;
        }
    }
}

/// Error between the measured specific force and the "up" direction predicted
/// by `q`, normalized by the measured magnitude. Zero when degenerate.
pub fn accel_error(q: &UnitQuaternion<f64>, accel: &Vector3<f64>) -> Vector3<f64> {
    let up_body = q.inverse() * Vector3::new(0.0, 0.0, -1.0);
    let magnitude = accel.norm();
    if !magnitude.is_finite() || magnitude < f64::EPSILON {
        return Vector3::zeros();
    }
    accel.cross(&up_body) / magnitude
}

/// Yaw component of the error between the measured field and the home field
/// rotated into the body by `q`. Zero when either vector is too short.
pub fn mag_error_z(q: &UnitQuaternion<f64>, field: &Vector3<f64>, be: &Vector3<f64>) -> f64 {
    let predicted = q.inverse() * be;
    let (mag_len, b_len) = (field.norm(), predicted.norm());
    if mag_len < MIN_FIELD_MAGNITUDE || b_len < MIN_FIELD_MAGNITUDE {
        return 0.0;
    }
    (field / mag_len).cross(&(predicted / b_len)).z
}

impl AttitudeEstimator for ComplementaryFilter {
    fn update(
        &mut self,
        frame: &SensorFrame,
        ctx: &ConfigurationContext,
    ) -> Result<Estimate, EstimatorError> {
        self.schedule_gains(frame.now, frame.armed, &ctx.settings);

        // Not clamped: a stalled clock yields a huge or non-finite step, which
        // the renormalization below turns into an identity reset.
        let dt = frame.now.saturating_sub(self.last_time).as_secs_f64();
        self.last_time = frame.now;

        let accel_err = accel_error(&self.orientation, &frame.accel.accel);
        let mag_err = match frame.fresh_mag() {
            Some(mag) if ctx.home.set => mag_error_z(&self.orientation, &mag.field, &ctx.home.be),
            _ => 0.0,
        };

        // --- Integral: accumulate into the bias ---
        let ki = self.gains.accel_ki * GAIN_SCALE;
        self.gyro_bias.x += accel_err.x * ki;
        self.gyro_bias.y += accel_err.y * ki;
        self.gyro_bias.z += mag_err * MAG_KI * GAIN_SCALE;

        // --- Proportional: correct this cycle's rate ---
        let kp = self.gains.accel_kp * GAIN_SCALE;
        let mut rate = frame.gyro.rate + self.gyro_bias;
        rate.x += accel_err.x * kp / dt;
        rate.y += accel_err.y * kp / dt;
        rate.z += accel_err.z * kp / dt + mag_err * MAG_KP * GAIN_SCALE / dt;

        let q_next = integrate_body_rate(self.orientation.quaternion(), &rate, dt);
        let (orientation, healed) = normalize_or_identity(canonicalize(q_next));
        if healed {
            warn!(dt, "complementary quaternion degenerated, reset to identity");
        }
        self.orientation = orientation;

        // Barometer is not used by this estimator.

        let navigation = frame
            .fresh_gps()
            .filter(|_| ctx.home.set)
            .map(|gps| NavigationState {
                position: ctx.converter.to_ned(gps),
                velocity: gps.velocity_ned(),
            });

        self.alarm = AlarmStatus::Clear;
        Ok(Estimate {
            attitude: AttitudeState::from_orientation(self.orientation),
            gyro_bias: GyroBias(self.gyro_bias),
            navigation,
            ned_debug: None,
        })
    }

    fn alarm(&self) -> AlarmStatus {
        self.alarm
    }

    fn apply_configuration(&mut self, ctx: &ConfigurationContext) {
        self.gyro_bias = ctx.bias_offset.0;
        debug!(bias = ?self.gyro_bias, "gyro bias reset from configuration");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::testing::*;
    use crate::types::FusionMode;
    use approx::assert_abs_diff_eq;

    const STEP: Duration = Duration::from_millis(2);

    fn filter_at(t: Duration) -> ComplementaryFilter {
        ComplementaryFilter::new(t, UnitQuaternion::identity())
    }

    #[test]
    fn zero_errors_leave_the_quaternion_unchanged() {
        let ctx = context(FusionMode::Complementary);
        let start = Duration::from_secs(10);
        let mut filter = filter_at(start);
        let estimate = filter.update(&level_frame(start + STEP), &ctx).unwrap();
        assert_eq!(estimate.attitude.quaternion(), [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(estimate.gyro_bias.0, Vector3::zeros());
        assert_eq!(filter.alarm(), AlarmStatus::Clear);
    }

    #[test]
    fn pure_yaw_rate_integrates() {
        let ctx = context(FusionMode::Complementary);
        let mut t = Duration::from_secs(10);
        let mut filter = filter_at(t);
        for _ in 0..500 {
            t += STEP;
            let mut frame = level_frame(t);
            frame.gyro.rate = Vector3::new(0.0, 0.0, 0.2);
            frame.fresh.mag = false;
            filter.update(&frame, &ctx).unwrap();
        }
        // One second at 0.2 rad/s.
        let (_, _, yaw) = filter.orientation().euler_angles();
        assert_abs_diff_eq!(yaw, 0.2, epsilon = 1e-6);
    }

    #[test]
    fn published_quaternion_is_unit_and_canonical() {
        let ctx = context(FusionMode::Complementary);
        let mut t = Duration::from_secs(10);
        let mut filter = filter_at(t);
        for i in 0..2000 {
            t += STEP;
            let mut frame = level_frame(t);
            // Spin hard enough to wrap the quaternion sign.
            frame.gyro.rate = Vector3::new(0.3, -0.2, if i < 1000 { 2.5 } else { -2.5 });
            let estimate = filter.update(&frame, &ctx).unwrap();
            let q = estimate.attitude.quaternion();
            let norm = q.iter().map(|c| c * c).sum::<f64>().sqrt();
            assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-5);
            assert!(q[0] >= 0.0);
        }
    }

    #[test]
    fn bootstrap_gains_converge_on_tilt() {
        let ctx = context(FusionMode::Complementary);
        let truth = UnitQuaternion::from_euler_angles(0.2, -0.1, 0.0);
        let mut t = Duration::from_millis(1500);
        let mut filter = filter_at(t);
        // Five seconds, all inside the bootstrap window.
        for _ in 0..2500 {
            t += STEP;
            let mut frame = frame_at(t, &truth);
            frame.fresh.mag = false;
            filter.update(&frame, &ctx).unwrap();
        }
        assert_eq!(filter.gains(), &AttitudeGains::BOOTSTRAP);
        let (roll, pitch, _) = filter.orientation().euler_angles();
        assert_abs_diff_eq!(roll, 0.2, epsilon = 1e-3);
        assert_abs_diff_eq!(pitch, -0.1, epsilon = 1e-3);
    }

    #[test]
    fn gain_schedule_follows_boot_time_and_arming() {
        let ctx = context(FusionMode::Complementary);
        let configured = ctx.settings.gains;
        let mut filter = filter_at(Duration::ZERO);

        filter.update(&level_frame(Duration::from_millis(500)), &ctx).unwrap();
        assert_eq!(filter.gains(), &configured);

        filter.update(&level_frame(Duration::from_secs(2)), &ctx).unwrap();
        assert_eq!(filter.gains(), &AttitudeGains::BOOTSTRAP);

        filter.update(&level_frame(Duration::from_secs(8)), &ctx).unwrap();
        assert_eq!(filter.gains(), &configured);

        let mut arming = level_frame(Duration::from_millis(8010));
        arming.armed = ArmedState::Arming;
        filter.update(&arming, &ctx).unwrap();
        assert_eq!(filter.gains(), &AttitudeGains::BOOTSTRAP);

        let mut armed = level_frame(Duration::from_millis(8020));
        armed.armed = ArmedState::Armed;
        filter.update(&armed, &ctx).unwrap();
        assert_eq!(filter.gains(), &configured);
    }

    #[test]
    fn arming_is_ignored_when_not_configured() {
        let mut ctx = context(FusionMode::Complementary);
        ctx.settings.zero_during_arming = false;
        let mut filter = filter_at(Duration::from_secs(9));
        let mut frame = level_frame(Duration::from_secs(10));
        frame.armed = ArmedState::Arming;
        filter.update(&frame, &ctx).unwrap();
        assert_eq!(filter.gains(), &ctx.settings.gains);
    }

    #[test]
    fn yaw_error_integrates_into_z_bias_only_from_the_magnetometer() {
        let ctx = context(FusionMode::Complementary);
        let truth = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.3);
        let mut t = Duration::from_secs(10);
        let mut filter = filter_at(t);

        t += STEP;
        filter.update(&frame_at(t, &truth), &ctx).unwrap();
        let bias_z = filter.gyro_bias().z;
        assert!(bias_z > 0.0);
        assert_abs_diff_eq!(filter.gyro_bias().x, 0.0, epsilon = 1e-15);

        // Without a fresh sample there is no yaw correction.
        t += STEP;
        let mut stale = frame_at(t, &truth);
        stale.fresh.mag = false;
        filter.update(&stale, &ctx).unwrap();
        assert_eq!(filter.gyro_bias().z, bias_z);
    }

    #[test]
    fn magnetometer_needs_home() {
        let mut ctx = context(FusionMode::Complementary);
        ctx.home.set = false;
        let truth = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.3);
        let mut filter = filter_at(Duration::from_secs(10));
        filter
            .update(&frame_at(Duration::from_secs(10) + STEP, &truth), &ctx)
            .unwrap();
        assert_eq!(filter.gyro_bias().z, 0.0);
    }

    #[test]
    fn short_vectors_give_no_mag_error() {
        let q = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.5);
        assert_eq!(mag_error_z(&q, &Vector3::new(0.5, 0.0, 0.0), &be()), 0.0);
        assert_eq!(mag_error_z(&q, &be(), &Vector3::new(0.1, 0.0, 0.0)), 0.0);
        assert_eq!(accel_error(&q, &Vector3::zeros()), Vector3::zeros());
    }

    #[test]
    fn stalled_clock_resets_to_identity() {
        // dT is deliberately not clamped; a zero step divides by zero and the
        // non-finite quaternion falls back to identity without an alarm.
        let ctx = context(FusionMode::Complementary);
        let t = Duration::from_secs(10);
        let tilted = UnitQuaternion::from_euler_angles(0.1, 0.0, 0.0);
        let mut filter = ComplementaryFilter::new(t, tilted);
        let estimate = filter.update(&level_frame(t), &ctx).unwrap();
        assert_eq!(estimate.attitude.quaternion(), [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(filter.alarm(), AlarmStatus::Clear);
    }

    #[test]
    fn fresh_gps_is_passed_through_unfiltered() {
        let ctx = context(FusionMode::Complementary);
        let mut filter = filter_at(Duration::from_secs(10));
        let mut frame = level_frame(Duration::from_secs(10) + STEP);
        if let Some(gps) = frame.gps.as_mut() {
            gps.latitude += 1_000;
            gps.groundspeed = 3.0;
        }
        let estimate = filter.update(&frame, &ctx).unwrap();
        let nav = estimate.navigation.unwrap();
        assert!(nav.position.x > 10.0);
        assert_abs_diff_eq!(nav.velocity.x, 3.0, epsilon = 1e-12);

        frame.fresh.gps = false;
        frame.now += STEP;
        assert!(filter.update(&frame, &ctx).unwrap().navigation.is_none());
    }

    #[test]
    fn configuration_seeds_the_bias() {
        let mut ctx = context(FusionMode::Complementary);
        ctx.bias_offset = GyroBias(Vector3::new(0.01, 0.02, 0.03));
        let mut filter = filter_at(Duration::ZERO);
        filter.apply_configuration(&ctx);
        assert_eq!(filter.gyro_bias(), &Vector3::new(0.01, 0.02, 0.03));
    }
}
