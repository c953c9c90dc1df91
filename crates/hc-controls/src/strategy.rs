//! Integral and derivative calculations for the PID controller.
//!
//! Time is measured in milliseconds, so gains are per millisecond: an error of
//! 0.5 held for a minute integrates to 30 000.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::time::Duration;

use hc_core::{millis_between, Timestamp};
use serde::{Deserialize, Serialize};

/// Accumulates error over time.
pub trait IntegralStrategy: Debug + Send {
    /// Take one error sample and return the integral including it.
    fn integrate(&mut self, at: Timestamp, error: f64) -> f64;

    fn reset(&mut self);
}

/// Rate of change of error.
pub trait DerivativeStrategy: Debug + Send {
    /// Take one error sample and return the rate of change since the previous one.
    ///
    /// May return a non-finite value when samples share a timestamp.
    fn differentiate(&mut self, at: Timestamp, error: f64) -> f64;

    fn reset(&mut self);
}

/// Which integral strategy to build.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegralKind {
    /// Unbounded sum of `error * dt`.
    #[default]
    Simple,
    /// Trapezoidal sum over the most recent `window`.
    SlidingWindow { window: Duration },
}

impl IntegralKind {
    pub fn build(self) -> Box<dyn IntegralStrategy> {
        match self {
            IntegralKind::Simple => Box::new(SimpleIntegral::default()),
            IntegralKind::SlidingWindow { window } => Box::new(SlidingWindowIntegral::new(window)),
        }
    }
}

/// Sum of `error * dt`, where `dt` is the time since the previous sample.
#[derive(Debug, Clone, Default)]
pub struct SimpleIntegral {
    last_at: Option<Timestamp>,
    sum: f64,
}

impl IntegralStrategy for SimpleIntegral {
    fn integrate(&mut self, at: Timestamp, error: f64) -> f64 {
        if let Some(last) = self.last_at {
            let dt = millis_between(last, at);
            if dt > 0.0 {
                self.sum += error * dt;
            }
        }
        self.last_at = Some(at);
        self.sum
    }

    fn reset(&mut self) {
        self.last_at = None;
        self.sum = 0.0;
    }
}

/// Trapezoidal integral over a trailing time window.
#[derive(Debug, Clone)]
pub struct SlidingWindowIntegral {
    window: Duration,
    last: Option<(Timestamp, f64)>,
    slices: VecDeque<(Timestamp, f64)>,
    sum: f64,
}

impl SlidingWindowIntegral {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: None,
            slices: VecDeque::new(),
            sum: 0.0,
        }
    }

    fn expire(&mut self, now: Timestamp) {
        let span = self.window.as_secs_f64() * 1000.0;
        while let Some((at, area)) = self.slices.front().copied() {
            if millis_between(at, now) <= span {
                break;
            }
            self.sum -= area;
            self.slices.pop_front();
        }
    }
}

impl IntegralStrategy for SlidingWindowIntegral {
    fn integrate(&mut self, at: Timestamp, error: f64) -> f64 {
        match self.last {
            Some((last_at, _)) if last_at >= at => {
                tracing::warn!(last = %last_at, now = %at, "integral sample out of sequence, ignored");
                return self.sum;
            }
            Some((last_at, last_error)) => {
                let area = (error + last_error) / 2.0 * millis_between(last_at, at);
                self.slices.push_back((at, area));
                self.sum += area;
            }
            None => {}
        }
        self.last = Some((at, error));
        self.expire(at);
        self.sum
    }

    fn reset(&mut self) {
        self.last = None;
        self.slices.clear();
        self.sum = 0.0;
    }
}

/// `(error - previous error) / dt`.
#[derive(Debug, Clone, Default)]
pub struct SimpleDerivative {
    last: Option<(Timestamp, f64)>,
}

impl DerivativeStrategy for SimpleDerivative {
    fn differentiate(&mut self, at: Timestamp, error: f64) -> f64 {
        let rate = match self.last {
            Some((last_at, last_error)) => (error - last_error) / millis_between(last_at, at),
            None => 0.0,
        };
        self.last = Some((at, error));
        rate
    }

    fn reset(&mut self) {
        self.last = None;
    }
}
