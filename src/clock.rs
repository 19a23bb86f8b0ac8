//! Time source for timestamps and the auto-save timer.
//!
//! Everything that reads the current time goes through [`Clock`], so tests
//! drive debounce deadlines and `updated` stamps with a [`ManualClock`].

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::fmt;
use std::sync::Mutex;

pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time at millisecond precision.
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start.trunc_subsecs(3)),
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += Duration::milliseconds(ms);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now = at.trunc_subsecs(3);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Next value for an `updated` field: `now`, or one millisecond past the
/// previous stamp when the clock has not moved.
pub fn advance_stamp(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}
