// attitude_sim/src/simulation/vehicle.rs

//! A kinematic vehicle that follows a script of constant-rate segments.

use nalgebra::{UnitQuaternion, Vector3};

use attitude_core::models::estimation::dynamics::integrated_imu::GRAVITY;

use crate::simulation::config::{Segment, VehicleConfig};

/// What the sensors would measure if they were perfect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TruthState {
    /// Body to NED.
    pub orientation: UnitQuaternion<f64>,
    /// Body rates in rad/s.
    pub body_rate: Vector3<f64>,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    /// Specific force in the body frame, m/s².
    pub specific_force: Vector3<f64>,
}

#[derive(Debug, Clone)]
pub struct ScriptedVehicle {
    orientation: UnitQuaternion<f64>,
    position: Vector3<f64>,
    segments: Vec<Segment>,
    elapsed: f64,
}

impl ScriptedVehicle {
    pub fn new(config: &VehicleConfig) -> Self {
        Self {
            orientation: config.initial_attitude,
            position: config.initial_position,
            segments: config.segments.clone(),
            elapsed: 0.0,
        }
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// The segment active at the current time, if the script has not ended.
    fn active_segment(&self) -> Option<&Segment> {
        let mut end = 0.0;
        self.segments.iter().find(|segment| {
            end += segment.duration_seconds;
            self.elapsed < end
        })
    }

    fn commanded(&self) -> (Vector3<f64>, Vector3<f64>) {
        match self.active_segment() {
            Some(segment) => (
                segment.body_rates_deg.map(f64::to_radians),
                segment.velocity_ned,
            ),
            None => (Vector3::zeros(), Vector3::zeros()),
        }
    }

    /// Advances the script by `dt` seconds. Rates and velocity are held over
    /// the step, so rotation is exact for each segment.
    pub fn step(&mut self, dt: f64) {
        let (rate, velocity) = self.commanded();
        self.orientation *= UnitQuaternion::from_scaled_axis(rate * dt);
        self.position += velocity * dt;
        self.elapsed += dt;
    }

    pub fn truth(&self) -> TruthState {
        let (body_rate, velocity) = self.commanded();
        // Constant velocity within a segment: the only force felt is the
        // reaction to gravity.
        let specific_force = self.orientation.inverse() * Vector3::new(0.0, 0.0, -GRAVITY);
        TruthState {
            orientation: self.orientation,
            body_rate,
            position: self.position,
            velocity,
            specific_force,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use attitude_core::frames::rotation::rpy_degrees;

    fn script() -> VehicleConfig {
        VehicleConfig {
            segments: vec![
                Segment {
                    duration_seconds: 1.0,
                    body_rates_deg: Vector3::zeros(),
                    velocity_ned: Vector3::new(1.0, 0.0, 0.0),
                },
                Segment {
                    duration_seconds: 2.0,
                    body_rates_deg: Vector3::new(0.0, 0.0, 45.0),
                    velocity_ned: Vector3::zeros(),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn follows_the_script_then_holds_still() {
        let mut vehicle = ScriptedVehicle::new(&script());
        // Binary-exact step so segment boundaries land on a step.
        for _ in 0..32 {
            vehicle.step(0.125);
        }
        let truth = vehicle.truth();
        assert_abs_diff_eq!(truth.position.x, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(rpy_degrees(&truth.orientation).z, 90.0, epsilon = 1e-6);
        assert_eq!(truth.body_rate, Vector3::zeros());
        assert_eq!(truth.velocity, Vector3::zeros());
        assert_abs_diff_eq!(vehicle.elapsed(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn level_vehicle_feels_gravity_upwards() {
        let vehicle = ScriptedVehicle::new(&VehicleConfig::default());
        let truth = vehicle.truth();
        assert_abs_diff_eq!(truth.specific_force, Vector3::new(0.0, 0.0, -GRAVITY), epsilon = 1e-12);
    }

    #[test]
    fn rolled_vehicle_sees_gravity_on_y() {
        let vehicle = ScriptedVehicle::new(&VehicleConfig {
            initial_attitude: UnitQuaternion::from_euler_angles(90f64.to_radians(), 0.0, 0.0),
            ..Default::default()
        });
        let f = vehicle.truth().specific_force;
        assert_abs_diff_eq!(f, Vector3::new(0.0, -GRAVITY, 0.0), epsilon = 1e-9);
    }
}
