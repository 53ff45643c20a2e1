// attitude_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::bus::{
    ConfigSource, FlightStatusSource, MonotonicClock, SampleSource, TelemetrySink, Watchdog,
};
pub use crate::estimation::AttitudeEstimator;
pub use crate::models::estimation::dynamics::EstimationDynamics;
pub use crate::models::estimation::measurement::Measurement;

// --- Core Data Structures (The "nouns" of the library) ---
pub use crate::alarms::{AlarmStatus, AlarmSubsystem};
pub use crate::context::{Calibration, ConfigHandle, ConfigurationContext, HomeLocation, Settings};
pub use crate::error::EstimatorError;
pub use crate::frames::{FilterState, StateVariable};
pub use crate::messages::{
    AccelSample, AttitudeState, BaroSample, GpsSample, GyroBias, GyroSample, MagSample,
    NavigationState, SensorKind,
};
pub use crate::types::{ArmedState, FusionMode};

// --- Estimation Algorithms ---
pub use crate::estimation::complementary::ComplementaryFilter;
pub use crate::estimation::fusion::{FusionEstimator, FusionPhase};
pub use crate::estimation::{ActiveEstimator, Estimate, SensorFrame};

// --- The task loop ---
pub use crate::bus::{sample_channel, ChannelSource, SampleSender, SystemClock};
pub use crate::task::{AttitudeTask, CycleStats, SensorFeeds};
