// attitude_core/src/bus.rs

//! The boundary between the estimator task and its host.
//!
//! Sensor feeds, the configuration store, the telemetry store, the flight
//! status object, the watchdog and the clock are all owned by the host. The
//! task only sees them through the traits below.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SendError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use nalgebra::Vector3;

use crate::alarms::{AlarmStatus, AlarmSubsystem};
use crate::context::{Calibration, HomeLocation, Settings};
use crate::error::RecvError;
use crate::messages::{AttitudeState, GyroBias};
use crate::types::ArmedState;

// =========================================================================
// == Inputs ==
// =========================================================================

/// A feed of samples of one sensor class.
pub trait SampleSource<T>: Send {
    /// Returns the most recent sample, waiting at most `timeout` for one to
    /// arrive. A zero timeout is a non-blocking poll.
    fn receive(&mut self, timeout: Duration) -> Result<T, RecvError>;
}

/// Receiving half of an in-process sample channel.
///
/// Samples that pile up between receives are collapsed: only the newest one is
/// returned, like a depth-one queue that overwrites.
#[derive(Debug)]
pub struct ChannelSource<T> {
    rx: Receiver<T>,
}

/// Sending half of an in-process sample channel.
#[derive(Debug, Clone)]
pub struct SampleSender<T> {
    tx: Sender<T>,
}

impl<T> SampleSender<T> {
    pub fn publish(&self, sample: T) -> Result<(), SendError<T>> {
        self.tx.send(sample)
    }
}

/// Creates a connected sender/source pair.
pub fn sample_channel<T>() -> (SampleSender<T>, ChannelSource<T>) {
    let (tx, rx) = mpsc::channel();
    (SampleSender { tx }, ChannelSource { rx })
}

impl<T> ChannelSource<T> {
    /// Drains everything queued, keeping the newest sample.
    fn drain_latest(&mut self) -> Result<Option<T>, RecvError> {
        let mut latest = None;
        loop {
            match self.rx.try_recv() {
                Ok(sample) => latest = Some(sample),
                Err(TryRecvError::Empty) => return Ok(latest),
                Err(TryRecvError::Disconnected) => {
                    return match latest {
                        Some(sample) => Ok(Some(sample)),
                        None => Err(RecvError::Disconnected),
                    }
                }
            }
        }
    }
}

impl<T: Send> SampleSource<T> for ChannelSource<T> {
    fn receive(&mut self, timeout: Duration) -> Result<T, RecvError> {
        if let Some(sample) = self.drain_latest()? {
            return Ok(sample);
        }
        if timeout.is_zero() {
            return Err(RecvError::Timeout);
        }
        let first = match self.rx.recv_timeout(timeout) {
            Ok(sample) => sample,
            Err(RecvTimeoutError::Timeout) => return Err(RecvError::Timeout),
            Err(RecvTimeoutError::Disconnected) => return Err(RecvError::Disconnected),
        };
        // Anything that arrived right behind it is newer.
        Ok(self.drain_latest().ok().flatten().unwrap_or(first))
    }
}

/// Get-all access to the three configuration records.
pub trait ConfigSource {
    fn settings(&self) -> Settings;
    fn calibration(&self) -> Calibration;
    fn home_location(&self) -> HomeLocation;
}

pub trait FlightStatusSource: Send {
    fn armed(&self) -> ArmedState;
}

/// A flight status that never changes; useful when the host has no arming
/// logic.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedFlightStatus(pub ArmedState);

impl FlightStatusSource for FixedFlightStatus {
    fn armed(&self) -> ArmedState {
        self.0
    }
}

// =========================================================================
// == Time ==
// =========================================================================

/// Monotonic time since boot.
pub trait MonotonicClock: Send {
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    boot: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for SystemClock {
    fn now(&self) -> Duration {
        self.boot.elapsed()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn starting_at(now: Duration) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn advance(&self, dt: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += dt;
    }

    pub fn set(&self, t: Duration) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = t;
    }
}

impl MonotonicClock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =========================================================================
// == Outputs ==
// =========================================================================

/// The telemetry objects the task publishes.
pub trait TelemetrySink: Send {
    fn set_attitude(&mut self, attitude: &AttitudeState);
    fn set_gyro_bias(&mut self, bias: &GyroBias);
    fn set_position(&mut self, position_ned: &Vector3<f64>);
    fn set_velocity(&mut self, velocity_ned: &Vector3<f64>);
    /// Raw GPS-derived NED position, published for offline inspection.
    fn set_ned_debug(&mut self, position_ned: &Vector3<f64>);
    fn set_alarm(&mut self, subsystem: AlarmSubsystem, status: AlarmStatus);
}

/// Heartbeat towards the hardware watchdog.
pub trait Watchdog: Send {
    fn feed(&mut self);
}

/// Keeps the last value of every published object. Test helper.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub(crate) struct RecordingSink {
    pub attitude: Option<AttitudeState>,
    pub attitude_writes: u64,
    pub gyro_bias: Option<GyroBias>,
    pub position: Option<Vector3<f64>>,
    pub velocity: Option<Vector3<f64>>,
    pub ned_debug: Option<Vector3<f64>>,
    pub alarm: Option<AlarmStatus>,
    pub alarm_writes: u64,
}

#[cfg(test)]
impl TelemetrySink for RecordingSink {
    fn set_attitude(&mut self, attitude: &AttitudeState) {
        self.attitude = Some(*attitude);
        self.attitude_writes += 1;
    }
    fn set_gyro_bias(&mut self, bias: &GyroBias) {
        self.gyro_bias = Some(*bias);
    }
    fn set_position(&mut self, position_ned: &Vector3<f64>) {
        self.position = Some(*position_ned);
    }
    fn set_velocity(&mut self, velocity_ned: &Vector3<f64>) {
        self.velocity = Some(*velocity_ned);
    }
    fn set_ned_debug(&mut self, position_ned: &Vector3<f64>) {
        self.ned_debug = Some(*position_ned);
    }
    fn set_alarm(&mut self, _subsystem: AlarmSubsystem, status: AlarmStatus) {
        self.alarm = Some(status);
        self.alarm_writes += 1;
    }
}
