// attitude_sim/src/simulation/sensors.rs

//! Noisy sensor models that turn the vehicle truth into bus samples.

use nalgebra::Vector3;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use attitude_core::bus::SampleSender;
use attitude_core::context::HomeLocation;
use attitude_core::frames::ned::{NedConverter, DEG_E7};
use attitude_core::messages::{
    AccelSample, BaroSample, GpsSample, GyroSample, MagSample, SensorKind,
};

use crate::error::SimError;
use crate::simulation::config::{
    BaroConfig, GpsConfig, SensorsConfig, VectorSensorConfig, Window,
};
use crate::simulation::prng::SimulationRng;
use crate::simulation::vehicle::TruthState;

// =========================================================================
// == Building Blocks ==
// =========================================================================

/// Fires once per period of simulated time.
#[derive(Debug, Clone, Copy)]
pub struct SensorTimer {
    period: f64,
    next_due: f64,
}

impl SensorTimer {
    pub fn new(rate_hz: f64) -> Self {
        Self {
            period: 1.0 / rate_hz,
            next_due: 0.0,
        }
    }

    /// True when a sample is due at `t`. Missed periods are skipped, not
    /// replayed.
    pub fn due(&mut self, t: f64) -> bool {
        // Guards against `k * period` landing a hair after `t`.
        const SLACK: f64 = 1e-9;
        if t + SLACK < self.next_due {
            return false;
        }
        while self.next_due <= t + SLACK {
            self.next_due += self.period;
        }
        true
    }
}

fn normal(stddev: f64) -> Result<Normal<f64>, SimError> {
    Normal::new(0.0, stddev)
        .map_err(|e| SimError::InvalidScenario(format!("bad noise stddev {stddev}: {e}")))
}

/// Constant bias plus independent white noise on each axis.
#[derive(Debug, Clone, Copy)]
struct VectorNoise {
    noise: [Normal<f64>; 3], // X, Y, Z
    bias: Vector3<f64>,
}

impl VectorNoise {
    fn new(config: &VectorSensorConfig) -> Result<Self, SimError> {
        let [sx, sy, sz] = config.noise_stddev;
        Ok(Self {
            noise: [normal(sx)?, normal(sy)?, normal(sz)?],
            bias: Vector3::from(config.bias),
        })
    }

    fn corrupt(&self, perfect: &Vector3<f64>, rng: &mut SimulationRng) -> Vector3<f64> {
        Vector3::new(
            perfect.x + self.bias.x + self.noise[0].sample(&mut rng.0),
            perfect.y + self.bias.y + self.noise[1].sample(&mut rng.0),
            perfect.z + self.bias.z + self.noise[2].sample(&mut rng.0),
        )
    }
}

struct VectorSensor {
    timer: SensorTimer,
    noise: VectorNoise,
}

impl VectorSensor {
    fn new(config: &VectorSensorConfig) -> Result<Self, SimError> {
        Ok(Self {
            timer: SensorTimer::new(config.rate_hz),
            noise: VectorNoise::new(config)?,
        })
    }
}

struct Barometer {
    timer: SensorTimer,
    noise: Normal<f64>,
}

impl Barometer {
    fn new(config: &BaroConfig) -> Result<Self, SimError> {
        Ok(Self {
            timer: SensorTimer::new(config.rate_hz),
            noise: normal(config.noise_stddev)?,
        })
    }
}

/// A receiver reporting fixes relative to a fixed geodetic origin.
struct Gps {
    timer: SensorTimer,
    position_noise: Normal<f64>,
    velocity_noise: Normal<f64>,
    satellites: u8,
    pdop: f64,
    origin: HomeLocation,
    converter: NedConverter,
}

impl Gps {
    fn new(config: &GpsConfig, origin: &HomeLocation) -> Result<Self, SimError> {
        Ok(Self {
            timer: SensorTimer::new(config.rate_hz),
            position_noise: normal(config.position_noise_stddev)?,
            velocity_noise: normal(config.velocity_noise_stddev)?,
            satellites: config.satellites,
            pdop: config.pdop,
            origin: *origin,
            converter: NedConverter::from_home(origin),
        })
    }

    fn fix(&self, truth: &TruthState, rng: &mut SimulationRng) -> GpsSample {
        let position = Vector3::new(
            truth.position.x + self.position_noise.sample(&mut rng.0),
            truth.position.y + self.position_noise.sample(&mut rng.0),
            truth.position.z,
        );
        // Invert the flat-Earth expansion around the origin.
        let scale = self.converter.scale();
        let d_lat = (position.x / scale.x).to_degrees() * DEG_E7;
        let d_lon = (position.y / scale.y).to_degrees() * DEG_E7;

        let ground = truth.velocity.xy();
        GpsSample {
            satellites: self.satellites,
            pdop: self.pdop,
            groundspeed: (ground.norm() + self.velocity_noise.sample(&mut rng.0)).max(0.0),
            heading: ground.y.atan2(ground.x).to_degrees().rem_euclid(360.0),
            latitude: self.origin.latitude.saturating_add(d_lat.round() as i32),
            longitude: self.origin.longitude.saturating_add(d_lon.round() as i32),
            altitude: self.origin.altitude - position.z,
            geoid_separation: 0.0,
        }
    }
}

// =========================================================================
// == The Suite ==
// =========================================================================

/// Sending halves of the five sample feeds.
#[derive(Debug, Clone)]
pub struct SensorSenders {
    pub gyro: SampleSender<GyroSample>,
    pub accel: SampleSender<AccelSample>,
    pub mag: SampleSender<MagSample>,
    pub baro: SampleSender<BaroSample>,
    pub gps: SampleSender<GpsSample>,
}

/// Every simulated sensor on the vehicle.
pub struct SensorSuite {
    gyro: VectorSensor,
    accel: VectorSensor,
    mag: VectorSensor,
    baro: Barometer,
    gps: Option<Gps>,
    gyro_dropouts: Vec<Window>,
    /// Earth field at the origin, NED. Fixed for the whole run.
    field_ned: Vector3<f64>,
    senders: SensorSenders,
}

impl SensorSuite {
    /// `origin` is where the world really is; later home changes in the
    /// estimator configuration do not move it.
    pub fn new(
        config: &SensorsConfig,
        origin: &HomeLocation,
        senders: SensorSenders,
    ) -> Result<Self, SimError> {
        let gps = if config.gps.enabled {
            Some(Gps::new(&config.gps, origin)?)
        } else {
            None
        };
        Ok(Self {
            gyro: VectorSensor::new(&config.gyro)?,
            accel: VectorSensor::new(&config.accel)?,
            mag: VectorSensor::new(&config.mag)?,
            baro: Barometer::new(&config.baro)?,
            gps,
            gyro_dropouts: config.gyro_dropouts.clone(),
            field_ned: origin.be,
            senders,
        })
    }

    pub fn set_satellites(&mut self, satellites: u8) {
        if let Some(gps) = &mut self.gps {
            debug!(satellites, "gps constellation changed");
            gps.satellites = satellites;
        }
    }

    /// Publishes every sample due at `t`.
    pub fn sample(
        &mut self,
        t: f64,
        truth: &TruthState,
        rng: &mut SimulationRng,
    ) -> Result<(), SimError> {
        let to_body = truth.orientation.inverse();

        // The accelerometer is read right behind the gyro, so publish it first.
        if self.accel.timer.due(t) {
            let accel = self.accel.noise.corrupt(&truth.specific_force, rng);
            self.senders
                .accel
                .publish(AccelSample { accel })
                .map_err(|_| SimError::FeedClosed(SensorKind::Accel))?;
        }
        if self.mag.timer.due(t) {
            let field = self.mag.noise.corrupt(&(to_body * self.field_ned), rng);
            self.senders
                .mag
                .publish(MagSample { field })
                .map_err(|_| SimError::FeedClosed(SensorKind::Mag))?;
        }
        if self.baro.timer.due(t) {
            let altitude = -truth.position.z + self.baro.noise.sample(&mut rng.0);
            self.senders
                .baro
                .publish(BaroSample { altitude })
                .map_err(|_| SimError::FeedClosed(SensorKind::Baro))?;
        }
        if let Some(gps) = &mut self.gps {
            if gps.timer.due(t) {
                let fix = gps.fix(truth, rng);
                self.senders
                    .gps
                    .publish(fix)
                    .map_err(|_| SimError::FeedClosed(SensorKind::Gps))?;
            }
        }

        let dropped = self.gyro_dropouts.iter().any(|w| w.contains(t));
        if self.gyro.timer.due(t) && !dropped {
            let rate = self.gyro.noise.corrupt(&truth.body_rate, rng);
            self.senders
                .gyro
                .publish(GyroSample { rate })
                .map_err(|_| SimError::FeedClosed(SensorKind::Gyro))?;
        }
        Ok(())
    }
}
