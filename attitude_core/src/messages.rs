// attitude_core/src/messages.rs

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::frames::rotation::rpy_degrees;

// =========================================================================
// == Sensor Samples ==
// =========================================================================

/// Identifies one of the five sensor feeds the task consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    Gyro,
    Accel,
    Mag,
    Baro,
    Gps,
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SensorKind::Gyro => "gyro",
            SensorKind::Accel => "accel",
            SensorKind::Mag => "magnetometer",
            SensorKind::Baro => "barometer",
            SensorKind::Gps => "gps",
        };
        f.write_str(name)
    }
}

/// Raw body-frame angular rate in rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GyroSample {
    pub rate: Vector3<f64>,
}

/// Body-frame specific force in m/s². A level vehicle at rest reads
/// `(0, 0, -g)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AccelSample {
    pub accel: Vector3<f64>,
}

/// Body-frame magnetic field, in the same units as `HomeLocation::be`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MagSample {
    pub field: Vector3<f64>,
}

/// Barometric altitude in meters (positive up).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BaroSample {
    pub altitude: f64,
}

/// One GPS position/velocity solution.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GpsSample {
    pub satellites: u8,
    /// Position dilution of precision.
    pub pdop: f64,
    /// Horizontal speed over ground in m/s.
    pub groundspeed: f64,
    /// Course over ground in degrees from north.
    pub heading: f64,
    /// Latitude in degrees × 1e7.
    pub latitude: i32,
    /// Longitude in degrees × 1e7.
    pub longitude: i32,
    /// Altitude above mean sea level in meters.
    pub altitude: f64,
    pub geoid_separation: f64,
}

impl GpsSample {
    /// Horizontal NED velocity derived from ground speed and heading.
    /// Vertical velocity is not reported by the receiver and is taken as zero.
    pub fn velocity_ned(&self) -> Vector3<f64> {
        let heading = self.heading.to_radians();
        Vector3::new(
            self.groundspeed * heading.cos(),
            self.groundspeed * heading.sin(),
            0.0,
        )
    }
}

/// A tagged sample as it travels over the sensor bus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Gyro(GyroSample),
    Accel(AccelSample),
    Mag(MagSample),
    Baro(BaroSample),
    Gps(GpsSample),
}

impl Sample {
    pub fn kind(&self) -> SensorKind {
        match self {
            Sample::Gyro(_) => SensorKind::Gyro,
            Sample::Accel(_) => SensorKind::Accel,
            Sample::Mag(_) => SensorKind::Mag,
            Sample::Baro(_) => SensorKind::Baro,
            Sample::Gps(_) => SensorKind::Gps,
        }
    }
}

// =========================================================================
// == Published Objects ==
// =========================================================================

/// Orientation of the body relative to NED, plus its Euler decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttitudeState {
    pub orientation: UnitQuaternion<f64>,
    /// Roll, pitch, yaw in degrees.
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl AttitudeState {
    pub fn from_orientation(orientation: UnitQuaternion<f64>) -> Self {
        let rpy = rpy_degrees(&orientation);
        Self {
            orientation,
            roll: rpy.x,
            pitch: rpy.y,
            yaw: rpy.z,
        }
    }

    /// The quaternion as `[q0, q1, q2, q3]`, scalar first.
    pub fn quaternion(&self) -> [f64; 4] {
        let q = self.orientation.quaternion();
        [q.w, q.i, q.j, q.k]
    }
}

impl Default for AttitudeState {
    fn default() -> Self {
        Self::from_orientation(UnitQuaternion::identity())
    }
}

/// Gyro bias estimate in rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GyroBias(pub Vector3<f64>);

/// Position (m) and velocity (m/s) in the local NED frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NavigationState {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}
