//! Timestamp utilities
//!
//! Every record carries two clocks: UTC wall-clock time for humans and a
//! monotonic nanosecond offset from session start for interval analysis.
//! Only the monotonic value is safe to subtract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// A single instant seen through both clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    /// Wall-clock time
    pub at: DateTime<Utc>,
    /// Nanoseconds since session start (monotonic)
    pub mono_ns: u64,
}

/// Session-scoped clock
///
/// Created once when the session starts. Cheap to copy; every component that
/// stamps records receives a copy of the same clock.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    epoch: Instant,
    started_at: DateTime<Utc>,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            started_at: now(),
        }
    }

    /// Wall-clock time at which the session started
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Monotonic nanoseconds since session start
    pub fn elapsed_ns(&self) -> u64 {
        // u64 nanoseconds overflow after ~584 years
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Stamp the current instant
    pub fn stamp(&self) -> Stamp {
        Stamp {
            at: now(),
            mono_ns: self.elapsed_ns(),
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::start()
    }
}
