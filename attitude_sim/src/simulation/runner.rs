// attitude_sim/src/simulation/runner.rs

//! Headless driver: steps the vehicle and sensors in simulated time and runs
//! one estimator cycle per gyro period.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, trace, warn};

use attitude_core::alarms::AlarmStatus;
use attitude_core::bus::{sample_channel, ManualClock};
use attitude_core::context::ConfigHandle;
use attitude_core::frames::rotation::rpy_degrees;
use attitude_core::task::{AttitudeTask, CycleStats, SensorFeeds};
use attitude_core::types::FusionMode;

use crate::error::SimError;
use crate::simulation::config::{EventConfig, ScenarioConfig};
use crate::simulation::prng::SimulationRng;
use crate::simulation::sensors::{SensorSenders, SensorSuite};
use crate::simulation::store::{ObjectStore, WriteCounts};
use crate::simulation::vehicle::ScriptedVehicle;

/// Command-line overrides applied on top of the scenario.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub duration_seconds: Option<f64>,
    pub mode: Option<FusionMode>,
    pub seed: Option<u64>,
    /// Pace the run against the wall clock.
    pub realtime: bool,
}

/// What a run produced, in a form that serializes to TOML.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub scenario: String,
    pub seed: u64,
    /// Estimator mode configured at the end of the run.
    pub mode: String,
    pub simulated_seconds: f64,
    pub final_alarm: AlarmStatus,
    pub alarm_transitions: u64,
    pub watchdog_feeds: u64,
    /// Angle between the published and the true attitude, degrees.
    pub attitude_error_deg: f64,
    pub estimated_rpy_deg: [f64; 3],
    pub truth_rpy_deg: [f64; 3],
    pub gyro_bias: [f64; 3],
    pub position_ned: Option<[f64; 3]>,
    pub stats: CycleStats,
    pub writes: WriteCounts,
}

impl RunSummary {
    pub fn log(&self) {
        info!(
            scenario = %self.scenario,
            mode = %self.mode,
            seed = self.seed,
            cycles = self.stats.cycles,
            published = self.stats.published,
            sensor_timeouts = self.stats.sensor_timeouts,
            not_initialized = self.stats.not_initialized,
            unsupported_mode = self.stats.unsupported_mode,
            "run finished"
        );
        info!(
            error_deg = self.attitude_error_deg,
            alarm = ?self.final_alarm,
            estimated = ?self.estimated_rpy_deg,
            truth = ?self.truth_rpy_deg,
            "final attitude"
        );
    }
}

/// Runs `scenario` to completion.
pub fn run_scenario(scenario: &ScenarioConfig, options: &RunOptions) -> Result<RunSummary, SimError> {
    let mut scenario = scenario.clone();
    if let Some(mode) = options.mode {
        scenario.estimator.settings.fusion_algorithm = mode.code();
    }
    let duration = options
        .duration_seconds
        .unwrap_or(scenario.simulation.duration_seconds);
    let (mut rng, seed) = SimulationRng::seeded(options.seed.or(scenario.simulation.seed));
    info!(
        scenario = %scenario.simulation.name,
        seed,
        duration,
        "starting run"
    );

    // --- 1. Host side: object store, configuration, feeds ---
    let store = ObjectStore::new(&scenario.estimator);
    let estimator = &scenario.estimator;
    let config = ConfigHandle::new(estimator.settings, estimator.calibration, estimator.home);

    let (gyro_tx, gyro) = sample_channel();
    let (accel_tx, accel) = sample_channel();
    let (mag_tx, mag) = sample_channel();
    let (baro_tx, baro) = sample_channel();
    let (gps_tx, gps) = sample_channel();
    let feeds = SensorFeeds {
        gyro: Box::new(gyro),
        accel: Box::new(accel),
        mag: Box::new(mag),
        baro: Box::new(baro),
        gps: Box::new(gps),
    };
    let senders = SensorSenders {
        gyro: gyro_tx,
        accel: accel_tx,
        mag: mag_tx,
        baro: baro_tx,
        gps: gps_tx,
    };

    // --- 2. The task under test ---
    let clock = ManualClock::starting_at(Duration::ZERO);
    let mut task = AttitudeTask::new(
        feeds,
        config.clone(),
        Box::new(clock.clone()),
        Box::new(store.clone()),
        store.clone(),
        Box::new(store.clone()),
    );
    task.start();

    // --- 3. The world ---
    let mut vehicle = ScriptedVehicle::new(&scenario.vehicle);
    let mut sensors = SensorSuite::new(&scenario.sensors, &scenario.estimator.home, senders)?;
    let mut events = scenario.events.clone();
    events.sort_by(|a, b| a.at_seconds.total_cmp(&b.at_seconds));
    let mut events = events.into_iter().peekable();

    let dt = 1.0 / scenario.sensors.gyro.rate_hz;
    let steps = (duration / dt).round() as u64;
    let settle_steps = (scenario.simulation.settle_seconds / dt).round() as u64;

    for step in 1..=steps {
        let t = step as f64 * dt;
        vehicle.step(dt);
        while let Some(event) = events.next_if(|e| e.at_seconds <= t) {
            apply_event(&event, &store, &config, &mut sensors);
        }
        sensors.sample(t, &vehicle.truth(), &mut rng)?;
        clock.set(Duration::from_secs_f64(t));

        if step >= settle_steps {
            // Failures also show up in the alarm and the cycle statistics.
            if let Err(err) = task.run_cycle() {
                trace!(t, %err, "cycle not committed");
            }
        }
        if options.realtime {
            std::thread::sleep(Duration::from_secs_f64(dt));
        }
    }

    // --- 4. Summary ---
    let contents = store.snapshot();
    let truth = vehicle.truth();
    let published = contents.attitude.unwrap_or_default();
    let code = contents.settings.fusion_algorithm;
    let mode = FusionMode::try_from(code)
        .map(|m| m.to_string())
        .unwrap_or_else(|_| format!("unknown ({code})"));

    Ok(RunSummary {
        scenario: scenario.simulation.name.clone(),
        seed,
        mode,
        simulated_seconds: steps as f64 * dt,
        final_alarm: contents.alarm,
        alarm_transitions: contents.alarm_transitions,
        watchdog_feeds: contents.watchdog_feeds,
        attitude_error_deg: truth.orientation.angle_to(&published.orientation).to_degrees(),
        estimated_rpy_deg: rpy_degrees(&published.orientation).into(),
        truth_rpy_deg: rpy_degrees(&truth.orientation).into(),
        gyro_bias: contents.gyro_bias.unwrap_or_default().0.into(),
        position_ned: contents.position.map(Into::into),
        stats: *task.stats(),
        writes: contents.writes,
    })
}

/// Applies one scripted change. Configuration edits go to the store first and
/// then through the configuration handle, as a host would do it.
fn apply_event(
    event: &EventConfig,
    store: &ObjectStore,
    config: &ConfigHandle,
    sensors: &mut SensorSuite,
) {
    info!(at = event.at_seconds, "scenario event");
    store.with(|c| {
        if let Some(mode) = event.mode {
            c.settings.fusion_algorithm = mode.code();
        }
        if let Some(code) = event.fusion_algorithm {
            if FusionMode::try_from(code).is_err() {
                warn!(code, "scenario selects an estimator that does not exist");
            }
            c.settings.fusion_algorithm = code;
        }
        if let Some(gains) = event.gains {
            c.settings.gains = gains;
        }
        if let Some(calibration) = event.calibration {
            c.calibration = calibration;
        }
        if let Some(home) = event.home {
            c.home = home;
        }
        if let Some(armed) = event.armed {
            c.armed = armed;
        }
    });
    if event.changes_configuration() {
        config.notify_changed(store);
    }
    if let Some(satellites) = event.satellites {
        sensors.set_satellites(satellites);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::config::parse_scenario;

    const STILL: &str = r#"
        [simulation]
        name = "still"
        seed = 7
        duration_seconds = 0.5

        [estimator.home]
        latitude = 473977420
        longitude = 85455940
        altitude = 488.0
        be = [200.0, 0.0, 400.0]
        set = true
    "#;

    #[test]
    fn one_cycle_per_gyro_period_after_settling() {
        let scenario = parse_scenario(STILL).unwrap();
        let summary = run_scenario(&scenario, &RunOptions::default()).unwrap();
        // 250 gyro periods, the first 49 of which fall inside the settle time.
        assert_eq!(summary.stats.cycles, 201);
        assert_eq!(summary.watchdog_feeds, summary.stats.cycles);
        assert_eq!(summary.stats.published, summary.stats.cycles);
        assert_eq!(summary.final_alarm, AlarmStatus::Clear);
        assert_eq!(summary.mode, "complementary");
        assert_eq!(summary.seed, 7);
        assert!(summary.attitude_error_deg < 2.0);
    }

    #[test]
    fn overrides_take_precedence() {
        let scenario = parse_scenario(STILL).unwrap();
        let options = RunOptions {
            duration_seconds: Some(0.2),
            mode: Some(FusionMode::FusionIndoor),
            seed: Some(99),
            realtime: false,
        };
        let summary = run_scenario(&scenario, &options).unwrap();
        assert_eq!(summary.seed, 99);
        assert_eq!(summary.mode, "fusion-indoor");
        assert_eq!(summary.stats.cycles, 51);
    }

    #[test]
    fn unknown_estimator_code_raises_the_alarm() {
        let mut scenario = parse_scenario(STILL).unwrap();
        scenario.events.push(EventConfig {
            at_seconds: 0.3,
            fusion_algorithm: Some(9),
            ..Default::default()
        });
        let summary = run_scenario(&scenario, &RunOptions::default()).unwrap();
        assert_eq!(summary.final_alarm, AlarmStatus::Error);
        assert!(summary.stats.unsupported_mode > 0);
        assert_eq!(summary.mode, "unknown (9)");
    }

    #[test]
    fn summary_serializes_to_toml() {
        let scenario = parse_scenario(STILL).unwrap();
        let options = RunOptions {
            duration_seconds: Some(0.15),
            ..Default::default()
        };
        let summary = run_scenario(&scenario, &options).unwrap();
        let text = toml::to_string_pretty(&summary).unwrap();
        assert!(text.contains("scenario = \"still\""));
        assert!(text.contains("[stats]"));
    }
}
