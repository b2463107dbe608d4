//! Clock
//!
//! Wall-clock source for token expiry and breaker cool-downs.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;

/// Time source interface (for dependency injection).
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// System clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for testing.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Create a clock frozen at the current system time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward, stopping at the latest representable time.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = saturating_after(*now, by);
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// `at + duration`, or `None` past the latest representable time.
pub(crate) fn checked_after(at: DateTime<Utc>, duration: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|duration| at.checked_add_signed(duration))
}

/// `at + duration`, clamped to the latest representable time.
pub(crate) fn saturating_after(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    checked_after(at, duration).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
