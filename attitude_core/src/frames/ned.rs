// attitude_core/src/frames/ned.rs

//! Flat-Earth conversion of GPS fixes into the local NED frame.
//!
//! The conversion is a first-order expansion around the home point: each axis
//! of the geodetic delta is multiplied by a constant scale. It is only
//! accurate close to home and is not a replacement for real geodesy.

use nalgebra::Vector3;

use crate::context::HomeLocation;
use crate::messages::GpsSample;

/// Equatorial radius used for the local linearization, in meters.
pub const EARTH_RADIUS_M: f64 = 6.378137e6;

/// Fixed-point scale of latitude/longitude fields (degrees × 1e7).
pub const DEG_E7: f64 = 1.0e7;

/// Converts geodetic deltas relative to home into NED meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NedConverter {
    /// Per-axis multipliers applied to (Δlat [rad], Δlon [rad], Δalt [m]).
    scale: Vector3<f64>,
    home_latitude: i32,
    home_longitude: i32,
    home_altitude: f64,
}

impl NedConverter {
    pub fn from_home(home: &HomeLocation) -> Self {
        let lat = (home.latitude as f64 / DEG_E7).to_radians();
        let radius = home.altitude + EARTH_RADIUS_M;
        Self {
            scale: Vector3::new(radius, lat.cos() * radius, -1.0),
            home_latitude: home.latitude,
            home_longitude: home.longitude,
            home_altitude: home.altitude,
        }
    }

    pub fn scale(&self) -> &Vector3<f64> {
        &self.scale
    }

    /// NED displacement of `fix` from the home point.
    pub fn to_ned(&self, fix: &GpsSample) -> Vector3<f64> {
        let d_lat = (fix.latitude as i64 - self.home_latitude as i64) as f64 / DEG_E7;
        let d_lon = (fix.longitude as i64 - self.home_longitude as i64) as f64 / DEG_E7;
        let delta = Vector3::new(
            d_lat.to_radians(),
            d_lon.to_radians(),
            fix.altitude + fix.geoid_separation - self.home_altitude,
        );
        self.scale.component_mul(&delta)
    }
}
