//! Suppresses repeats of the same signal arriving faster than a minimum delay.

use std::time::Duration;

use hc_core::millis_between;

use crate::processor::SignalProcessor;
use crate::signal::Signal;

/// Decides whether two signals count as "the same" for rate limiting.
pub trait SameSignal<T, P> {
    fn same(&self, a: &Signal<T, P>, b: &Signal<T, P>) -> bool;
}

/// Signals are the same only if they are equal in every field, timestamp included.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<T: PartialEq, P: PartialEq> SameSignal<T, P> for Identity {
    fn same(&self, a: &Signal<T, P>, b: &Signal<T, P>) -> bool {
        a == b
    }
}

/// Signals are the same if their value and status match; time is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueEquals;

impl<T: PartialEq, P> SameSignal<T, P> for ValueEquals {
    fn same(&self, a: &Signal<T, P>, b: &Signal<T, P>) -> bool {
        a.value() == b.value() && a.status() == b.status()
    }
}

impl<T, P, F> SameSignal<T, P> for F
where
    F: Fn(&Signal<T, P>, &Signal<T, P>) -> bool,
{
    fn same(&self, a: &Signal<T, P>, b: &Signal<T, P>) -> bool {
        self(a, b)
    }
}

/// Drops a signal that is the same as the last emitted one and arrived less than
/// `delay` after it. Anything different, or anything arriving later, passes.
pub struct RateLimiter<T, P = (), C = Identity> {
    delay: Duration,
    comparator: C,
    last: Option<Signal<T, P>>,
}

impl<T, P> RateLimiter<T, P, Identity> {
    /// Rate limiter comparing whole signals.
    ///
    /// Signals carry their own timestamps, so this only drops exact repeats; supply
    /// [`ValueEquals`] or a closure through [`RateLimiter::with_comparator`] to drop
    /// repeated readings.
    pub fn new(delay: Duration) -> Self {
        Self::with_comparator(delay, Identity)
    }
}

impl<T, P, C> RateLimiter<T, P, C> {
    pub fn with_comparator(delay: Duration, comparator: C) -> Self {
        Self {
            delay,
            comparator,
            last: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<T, P, C> SignalProcessor<T, T, P> for RateLimiter<T, P, C>
where
    T: Clone,
    P: Clone,
    C: SameSignal<T, P>,
{
    fn process(&mut self, signal: Signal<T, P>) -> Option<Signal<T, P>> {
        if let Some(last) = &self.last {
            let elapsed = millis_between(last.timestamp(), signal.timestamp());
            if elapsed < self.delay.as_secs_f64() * 1000.0 && self.comparator.same(last, &signal) {
                return None;
            }
        }
        self.last = Some(signal.clone());
        Some(signal)
    }
}
