//! A controllable clock for deterministic timestamps in tests.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use ployz_executor::ports::Clock as ClockPort;

/// A [`ClockPort`] that returns a fixed-then-advanceable instant instead of
/// wall-clock time, so executor tests don't race real time (heartbeats,
/// health-check timeouts).
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    /// Creates a clock starting at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    /// Advances the clock by `duration`.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.lock();
        *now += duration;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new("2026-01-01T00:00:00Z".parse().expect("valid timestamp"))
    }
}

impl ClockPort for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
