// attitude_core/src/alarms.rs

//! Tri-level health reporting for the attitude subsystem.
//!
//! The alarm is a level, not an event log: every cycle overwrites it with the
//! status of that cycle. The reporter only remembers the previous level so it
//! can log transitions.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bus::TelemetrySink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum AlarmStatus {
    #[default]
    Clear,
    Warning,
    Error,
}

/// The subsystem tag an alarm is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlarmSubsystem {
    Attitude,
}

/// Publishes the alarm level for one subsystem and tracks transitions.
#[derive(Debug, Clone)]
pub struct AlarmReporter {
    subsystem: AlarmSubsystem,
    current: AlarmStatus,
    transitions: u64,
}

impl AlarmReporter {
    pub fn new(subsystem: AlarmSubsystem) -> Self {
        Self {
            subsystem,
            current: AlarmStatus::Clear,
            transitions: 0,
        }
    }

    /// Overwrites the published level. Always writes through to the sink so
    /// the store reflects this cycle, even when the level did not change.
    pub fn report(&mut self, status: AlarmStatus, sink: &mut dyn TelemetrySink) {
        if status != self.current {
            self.transitions += 1;
            match status {
                AlarmStatus::Clear => info!("{:?} alarm cleared", self.subsystem),
                AlarmStatus::Warning | AlarmStatus::Error => warn!(
                    "{:?} alarm raised: {:?} -> {:?}",
                    self.subsystem, self.current, status
                ),
            }
        }
        self.current = status;
        sink.set_alarm(self.subsystem, status);
    }

    pub fn current(&self) -> AlarmStatus {
        self.current
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }
}
