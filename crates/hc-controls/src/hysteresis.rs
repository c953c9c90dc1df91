//! Two-state controller with a dead band.
//!
//! Switches on once the sample reaches `setpoint + threshold_high`, and back off
//! once it falls to `setpoint + threshold_low`. In between, the previous state
//! holds. The output signal is `+1` when on and `-1` when off.

use hc_signal::Signal;
use serde::{Deserialize, Serialize};

use crate::controller::{ControlOutput, ControlStatus, ProcessController, Tracker};
use crate::error::{ControlError, ControlResult};

/// Default half-width of the dead band.
pub const DEFAULT_HYSTERESIS: f64 = 1.0;

/// Hysteresis output, with the sample that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HysteresisStatus {
    pub base: ControlStatus,
    pub sample: f64,
}

impl HysteresisStatus {
    pub fn is_on(&self) -> bool {
        self.base.signal > 0.0
    }
}

impl ControlOutput for HysteresisStatus {
    fn status(&self) -> &ControlStatus {
        &self.base
    }
}

#[derive(Debug, Clone)]
pub struct HysteresisController<P = ()> {
    tracker: Tracker<P>,
    threshold_low: f64,
    threshold_high: f64,
    on: bool,
}

impl<P: Clone> HysteresisController<P> {
    /// Symmetric band of [`DEFAULT_HYSTERESIS`].
    pub fn new(name: impl Into<String>, setpoint: f64) -> ControlResult<Self> {
        Self::with_thresholds(name, setpoint, -DEFAULT_HYSTERESIS, DEFAULT_HYSTERESIS)
    }

    /// Symmetric band of `hysteresis` on each side.
    pub fn symmetric(name: impl Into<String>, setpoint: f64, hysteresis: f64) -> ControlResult<Self> {
        Self::with_thresholds(name, setpoint, -hysteresis, hysteresis)
    }

    /// `threshold_low` must be negative and `threshold_high` positive.
    pub fn with_thresholds(
        name: impl Into<String>,
        setpoint: f64,
        threshold_low: f64,
        threshold_high: f64,
    ) -> ControlResult<Self> {
        if !(threshold_low < 0.0) {
            return Err(ControlError::InvalidArg {
                what: "low threshold must be negative",
            });
        }
        if !(threshold_high > 0.0) || !threshold_high.is_finite() || !threshold_low.is_finite() {
            return Err(ControlError::InvalidArg {
                what: "high threshold must be positive",
            });
        }
        Ok(Self {
            tracker: Tracker::new(name, setpoint)?,
            threshold_low,
            threshold_high,
            on: false,
        })
    }

    pub fn threshold_low(&self) -> f64 {
        self.threshold_low
    }

    pub fn threshold_high(&self) -> f64 {
        self.threshold_high
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

impl<P: Clone> ProcessController<P> for HysteresisController<P> {
    type Output = HysteresisStatus;

    fn name(&self) -> &str {
        &self.tracker.name
    }

    fn setpoint(&self) -> f64 {
        self.tracker.setpoint
    }

    fn set_setpoint(&mut self, setpoint: f64) -> ControlResult<Option<Signal<HysteresisStatus, P>>> {
        self.tracker.set_setpoint(setpoint)?;
        Ok(self.tracker.pv.clone().map(|pv| self.compute(pv)))
    }

    fn process_variable(&self) -> Option<&Signal<f64, P>> {
        self.tracker.pv.as_ref()
    }

    fn compute(&mut self, pv: Signal<f64, P>) -> Signal<HysteresisStatus, P> {
        let sample = match self.tracker.accept(&pv) {
            Ok(sample) => sample,
            Err(failed) => return failed,
        };
        let setpoint = self.tracker.setpoint;

        let was_on = self.on;
        if self.on {
            if sample - self.threshold_low <= setpoint {
                self.on = false;
            }
        } else if sample - self.threshold_high >= setpoint {
            self.on = true;
        }
        if was_on != self.on {
            tracing::trace!(controller = %self.tracker.name, was_on, on = self.on, "state change");
        }

        pv.derive(Some(HysteresisStatus {
            base: ControlStatus {
                setpoint,
                error: setpoint - sample,
                signal: if self.on { DEFAULT_HYSTERESIS } else { -DEFAULT_HYSTERESIS },
            },
            sample,
        }))
    }
}

impl<P: Clone> hc_signal::SignalProcessor<f64, HysteresisStatus, P> for HysteresisController<P> {
    fn process(&mut self, signal: Signal<f64, P>) -> Option<Signal<HysteresisStatus, P>> {
        Some(self.compute(signal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use hc_core::Timestamp;
    use hc_signal::{SignalError, SignalProcessor};

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap() + Duration::seconds(secs)
    }

    fn signals(c: &mut HysteresisController, input: &[f64]) -> Vec<f64> {
        let signals = input
            .iter()
            .enumerate()
            .map(|(n, v)| Signal::ok(t(n as i64), *v));
        c.process_all(signals)
            .into_iter()
            .map(|s| s.value().unwrap().signal())
            .collect()
    }

    #[test]
    fn thresholds_validated() {
        assert!(HysteresisController::<()>::with_thresholds("h", 0.0, 0.5, 1.0).is_err());
        assert!(HysteresisController::<()>::with_thresholds("h", 0.0, -0.5, 0.0).is_err());
        assert!(HysteresisController::<()>::with_thresholds("h", 0.0, -0.5, 2.0).is_ok());
    }

    #[test]
    fn dead_band_holds_state() {
        let mut c = HysteresisController::new("h", 20.0).unwrap();
        assert_eq!(
            signals(&mut c, &[20.0, 20.5, 21.0, 20.5, 19.5, 19.0, 19.5, 20.0]),
            vec![-1.0, -1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0]
        );
    }

    #[test]
    fn asymmetric_band() {
        let mut c = HysteresisController::with_thresholds("h", 0.0, -0.5, 2.0).unwrap();
        assert_eq!(
            signals(&mut c, &[1.0, 2.0, 0.0, -0.5]),
            vec![-1.0, 1.0, 1.0, -1.0]
        );
    }

    #[test]
    fn setpoint_change_flips_without_new_sample() {
        let mut c = HysteresisController::<()>::new("h", 20.0).unwrap();
        let first = c.compute(Signal::ok(t(0), 22.0));
        assert!(first.value().unwrap().is_on());

        let flipped = c.set_setpoint(25.0).unwrap().expect("reevaluated output");
        assert!(!flipped.value().unwrap().is_on());
        assert_eq!(flipped.value().unwrap().sample, 22.0);
    }

    #[test]
    fn error_keeps_state() {
        let mut c = HysteresisController::<()>::new("h", 20.0).unwrap();
        c.compute(Signal::ok(t(0), 22.0));
        let failed = c.compute(Signal::failure(t(1), SignalError::Upstream("x".into())));
        assert!(failed.is_error());
        assert!(c.is_on());
        assert_eq!(c.process_variable().and_then(|s| s.value()), Some(&22.0));
    }
}
