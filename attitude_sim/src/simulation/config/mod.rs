// attitude_sim/src/simulation/config/mod.rs

//! Loading and validating scenario files.

mod serde_helpers;
pub mod structs;

use std::path::Path;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use tracing::info;

use crate::error::SimError;
pub use structs::{
    BaroConfig, EstimatorConfig, EventConfig, GpsConfig, ScenarioConfig, Segment, SensorsConfig,
    Simulation, VectorSensorConfig, VehicleConfig, Window,
};

/// Prefix of the environment variables that override scenario keys, e.g.
/// `ATTITUDE_SIMULATION__SEED=7`.
pub const ENV_PREFIX: &str = "ATTITUDE_";

/// Reads a scenario file, applies environment overrides and validates it.
pub fn load_scenario(path: &Path) -> Result<ScenarioConfig, SimError> {
    info!("Loading scenario from: {}", path.display());
    let figment = Figment::new()
        .merge(Toml::file_exact(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));
    extract(figment)
}

/// Parses a scenario from TOML text. No environment overrides.
pub fn parse_scenario(toml: &str) -> Result<ScenarioConfig, SimError> {
    extract(Figment::from(Toml::string(toml)))
}

fn extract(figment: Figment) -> Result<ScenarioConfig, SimError> {
    let scenario: ScenarioConfig = figment.extract().map_err(Box::new)?;
    validate(&scenario)?;
    Ok(scenario)
}

/// Rejects scenarios the runner cannot execute.
pub fn validate(scenario: &ScenarioConfig) -> Result<(), SimError> {
    let invalid = |msg: String| -> Result<(), SimError> { Err(SimError::InvalidScenario(msg)) };

    let sim = &scenario.simulation;
    if !(sim.duration_seconds.is_finite() && sim.duration_seconds > 0.0) {
        return invalid(format!("duration_seconds must be positive, got {}", sim.duration_seconds));
    }
    if !(sim.settle_seconds.is_finite() && sim.settle_seconds >= 0.0) {
        return invalid(format!("settle_seconds must be non-negative, got {}", sim.settle_seconds));
    }

    let sensors = &scenario.sensors;
    let rates = [
        ("gyro", sensors.gyro.rate_hz),
        ("accel", sensors.accel.rate_hz),
        ("mag", sensors.mag.rate_hz),
        ("baro", sensors.baro.rate_hz),
        ("gps", sensors.gps.rate_hz),
    ];
    for (name, rate) in rates {
        if !(rate.is_finite() && rate > 0.0) {
            return invalid(format!("{name} rate_hz must be positive, got {rate}"));
        }
    }

    let stddevs = sensors
        .gyro
        .noise_stddev
        .iter()
        .chain(&sensors.accel.noise_stddev)
        .chain(&sensors.mag.noise_stddev)
        .chain([
            &sensors.baro.noise_stddev,
            &sensors.gps.position_noise_stddev,
            &sensors.gps.velocity_noise_stddev,
        ]);
    for stddev in stddevs {
        if !(stddev.is_finite() && *stddev >= 0.0) {
            return invalid(format!("noise standard deviations must be non-negative, got {stddev}"));
        }
    }

    for window in &sensors.gyro_dropouts {
        if window.end <= window.start {
            return invalid(format!(
                "gyro dropout window [{}, {}) is empty",
                window.start, window.end
            ));
        }
    }

    for segment in &scenario.vehicle.segments {
        if !(segment.duration_seconds.is_finite() && segment.duration_seconds >= 0.0) {
            return invalid(format!(
                "segment duration must be non-negative, got {}",
                segment.duration_seconds
            ));
        }
    }

    for event in &scenario.events {
        if !(event.at_seconds.is_finite() && event.at_seconds >= 0.0) {
            return invalid(format!("event time must be non-negative, got {}", event.at_seconds));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use attitude_core::frames::rotation::rpy_degrees;
    use attitude_core::types::FusionMode;

    const SCENARIO: &str = r#"
        [simulation]
        name = "hover"
        seed = 42
        duration_seconds = 3.0

        [estimator.settings]
        fusion_algorithm = 1

        [estimator.home]
        latitude = 473977420
        longitude = 85455940
        altitude = 488.0
        be = [200.0, 0.0, 400.0]
        set = true

        [vehicle]
        initial_attitude = [5.0, -3.0, 90.0]

        [[vehicle.segments]]
        duration_seconds = 1.0
        body_rates_deg = [0.0, 0.0, 10.0]

        [sensors.gps]
        enabled = true
        rate_hz = 5.0
        satellites = 8
        pdop = 1.1

        [[sensors.gyro_dropouts]]
        start = 1.0
        end = 1.1

        [[events]]
        at_seconds = 2.0
        mode = "fusion-outdoor"
        satellites = 4
    "#;

    #[test]
    fn parses_a_full_scenario() {
        let scenario = parse_scenario(SCENARIO).unwrap();
        assert_eq!(scenario.simulation.name, "hover");
        assert_eq!(scenario.simulation.seed, Some(42));
        assert_abs_diff_eq!(scenario.simulation.settle_seconds, 0.1);
        assert_eq!(
            scenario.estimator.settings.mode().unwrap(),
            FusionMode::FusionIndoor
        );
        assert!(scenario.estimator.home.set);
        assert_abs_diff_eq!(scenario.estimator.home.be.z, 400.0);

        let rpy = rpy_degrees(&scenario.vehicle.initial_attitude);
        assert_abs_diff_eq!(rpy.z, 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(scenario.vehicle.segments[0].body_rates_deg.z, 10.0);

        // Untouched sections fall back to their defaults.
        assert_abs_diff_eq!(scenario.sensors.gyro.rate_hz, 500.0);
        assert!(scenario.sensors.gps.enabled);
        assert_eq!(scenario.events[0].mode, Some(FusionMode::FusionOutdoor));
        assert_eq!(scenario.events[0].satellites, Some(4));
        assert!(scenario.events[0].changes_configuration());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = parse_scenario("[simulation]\nduration_seconds = 1.0\nspeed = 3\n").unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        for toml in [
            "[simulation]\nduration_seconds = 0.0\n",
            "[sensors.gyro]\nrate_hz = 0.0\n",
            "[sensors.baro]\nrate_hz = 25.0\nnoise_stddev = -1.0\n",
            "[[sensors.gyro_dropouts]]\nstart = 2.0\nend = 1.0\n",
            "[[events]]\nat_seconds = -1.0\n",
        ] {
            let err = parse_scenario(toml).unwrap_err();
            assert!(matches!(err, SimError::InvalidScenario(_)), "{toml}");
        }
    }
}
