//! Timestamps and clocks.
//!
//! Signals are stamped with wall clock time. Components that need "now"
//! (timeout checks, economizer staleness, half-life sampling) take a
//! [`Clock`] so tests can drive time by hand.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{CoreError, CoreResult};

/// Point in time a signal was produced at.
pub type Timestamp = DateTime<Utc>;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward, stopping at the far future.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = plus(*now, by);
    }

    pub fn set(&self, to: Timestamp) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Milliseconds from `from` to `to`, negative if `to` is earlier.
pub fn millis_between(from: Timestamp, to: Timestamp) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1000.0,
        None => delta.num_milliseconds() as f64,
    }
}

/// Convert a std duration into a chrono one.
pub fn to_chrono(d: Duration) -> CoreResult<chrono::Duration> {
    chrono::Duration::from_std(d).map_err(|_| CoreError::DurationOutOfRange {
        what: "duration does not fit a timestamp offset",
    })
}

/// `at + d`, saturating at the far future.
pub fn plus(at: Timestamp, d: Duration) -> Timestamp {
    to_chrono(d)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_shared_state() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let other = clock.clone();

        clock.advance(Duration::from_secs(90));

        assert_eq!(other.now(), plus(start, Duration::from_secs(90)));
    }

    #[test]
    fn manual_clock_saturates() {
        let clock = ManualClock::new(Utc::now());
        clock.advance(Duration::MAX);
        assert_eq!(clock.now(), DateTime::<Utc>::MAX_UTC);
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now(), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn millis_between_is_signed() {
        let t0 = Utc::now();
        let t1 = plus(t0, Duration::from_millis(1500));
        assert_eq!(millis_between(t0, t1), 1500.0);
        assert_eq!(millis_between(t1, t0), -1500.0);
    }
}
