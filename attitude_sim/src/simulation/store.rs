// attitude_sim/src/simulation/store.rs

//! An in-memory stand-in for the host object store.
//!
//! One shared handle plays every host-side role the task needs: configuration
//! source, flight status, telemetry sink and watchdog. Clones share contents.

use std::sync::{Arc, Mutex, PoisonError};

use nalgebra::Vector3;
use serde::Serialize;

use attitude_core::alarms::{AlarmStatus, AlarmSubsystem};
use attitude_core::bus::{ConfigSource, FlightStatusSource, TelemetrySink, Watchdog};
use attitude_core::context::{Calibration, HomeLocation, Settings};
use attitude_core::messages::{AttitudeState, GyroBias};
use attitude_core::types::ArmedState;

use crate::simulation::config::EstimatorConfig;

/// How many times each telemetry object was written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteCounts {
    pub attitude: u64,
    pub gyro_bias: u64,
    pub position: u64,
    pub velocity: u64,
    pub ned_debug: u64,
    pub alarm: u64,
}

#[derive(Debug, Clone, Default)]
pub struct StoreContents {
    // --- Configuration objects ---
    pub settings: Settings,
    pub calibration: Calibration,
    pub home: HomeLocation,
    pub armed: ArmedState,

    // --- Telemetry objects ---
    pub attitude: Option<AttitudeState>,
    pub gyro_bias: Option<GyroBias>,
    pub position: Option<Vector3<f64>>,
    pub velocity: Option<Vector3<f64>>,
    pub ned_debug: Option<Vector3<f64>>,
    pub alarm: AlarmStatus,
    pub alarm_transitions: u64,
    pub writes: WriteCounts,
    pub watchdog_feeds: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    inner: Arc<Mutex<StoreContents>>,
}

impl ObjectStore {
    pub fn new(initial: &EstimatorConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreContents {
                settings: initial.settings,
                calibration: initial.calibration,
                home: initial.home,
                armed: initial.armed,
                ..Default::default()
            })),
        }
    }

    /// A copy of everything currently in the store.
    pub fn snapshot(&self) -> StoreContents {
        self.with(|contents| contents.clone())
    }

    /// Runs `f` with exclusive access to the contents.
    pub fn with<R>(&self, f: impl FnOnce(&mut StoreContents) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl ConfigSource for ObjectStore {
    fn settings(&self) -> Settings {
        self.with(|c| c.settings)
    }

    fn calibration(&self) -> Calibration {
        self.with(|c| c.calibration)
    }

    fn home_location(&self) -> HomeLocation {
        self.with(|c| c.home)
    }
}

impl FlightStatusSource for ObjectStore {
    fn armed(&self) -> ArmedState {
        self.with(|c| c.armed)
    }
}

impl TelemetrySink for ObjectStore {
    fn set_attitude(&mut self, attitude: &AttitudeState) {
        self.with(|c| {
            c.attitude = Some(*attitude);
            c.writes.attitude += 1;
        });
    }

    fn set_gyro_bias(&mut self, bias: &GyroBias) {
        self.with(|c| {
            c.gyro_bias = Some(*bias);
            c.writes.gyro_bias += 1;
        });
    }

    fn set_position(&mut self, position_ned: &Vector3<f64>) {
        self.with(|c| {
            c.position = Some(*position_ned);
            c.writes.position += 1;
        });
    }

    fn set_velocity(&mut self, velocity_ned: &Vector3<f64>) {
        self.with(|c| {
            c.velocity = Some(*velocity_ned);
            c.writes.velocity += 1;
        });
    }

    fn set_ned_debug(&mut self, position_ned: &Vector3<f64>) {
        self.with(|c| {
            c.ned_debug = Some(*position_ned);
            c.writes.ned_debug += 1;
        });
    }

    fn set_alarm(&mut self, _subsystem: AlarmSubsystem, status: AlarmStatus) {
        self.with(|c| {
            if c.alarm != status {
                c.alarm_transitions += 1;
            }
            c.alarm = status;
            c.writes.alarm += 1;
        });
    }
}

impl Watchdog for ObjectStore {
    fn feed(&mut self) {
        self.with(|c| c.watchdog_feeds += 1);
    }
}
