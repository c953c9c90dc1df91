//! Exponentially fading response to changes in the process variable.
//!
//! Every change in the sample value is added to the current output, and the sum
//! then halves every `half_life`. The setpoint is always zero.

use std::time::Duration;

use hc_core::{millis_between, Timestamp};
use hc_signal::Signal;

use crate::controller::{ControlStatus, ProcessController, Tracker};
use crate::error::{ControlError, ControlResult};

#[derive(Debug, Clone, Copy)]
struct Baseline {
    start: Timestamp,
    value: f64,
}

#[derive(Debug, Clone)]
pub struct HalfLifeController<P = ()> {
    tracker: Tracker<P>,
    half_life: Duration,
    last_sample: Option<f64>,
    last_output: Option<f64>,
    baseline: Option<Baseline>,
}

impl<P: Clone> HalfLifeController<P> {
    pub fn new(name: impl Into<String>, half_life: Duration) -> ControlResult<Self> {
        if half_life.is_zero() {
            return Err(ControlError::InvalidArg {
                what: "half life must be positive",
            });
        }
        let tracker = Tracker::new(name, 0.0)?;
        tracing::debug!(controller = %tracker.name, ?half_life, "created half-life controller");
        Ok(Self {
            tracker,
            half_life,
            last_sample: None,
            last_output: None,
            baseline: None,
        })
    }

    pub fn half_life(&self) -> Duration {
        self.half_life
    }

    /// Decayed output at `now`, without feeding a new sample.
    pub fn value_at(&self, now: Timestamp) -> f64 {
        match self.baseline {
            Some(b) => self.decay(b, now),
            None => self.last_output.unwrap_or(0.0),
        }
    }

    fn decay(&self, baseline: Baseline, now: Timestamp) -> f64 {
        let elapsed = millis_between(baseline.start, now).max(0.0);
        let span = self.half_life.as_secs_f64() * 1000.0;
        baseline.value * 0.5f64.powf(elapsed / span)
    }
}

impl<P: Clone> ProcessController<P> for HalfLifeController<P> {
    type Output = ControlStatus;

    fn name(&self) -> &str {
        &self.tracker.name
    }

    fn setpoint(&self) -> f64 {
        0.0
    }

    fn set_setpoint(&mut self, setpoint: f64) -> ControlResult<Option<Signal<ControlStatus, P>>> {
        if setpoint != 0.0 {
            return Err(ControlError::InvalidSetpoint {
                controller: self.tracker.name.clone(),
                value: setpoint,
            });
        }
        Ok(None)
    }

    fn process_variable(&self) -> Option<&Signal<f64, P>> {
        self.tracker.pv.as_ref()
    }

    fn compute(&mut self, pv: Signal<f64, P>) -> Signal<ControlStatus, P> {
        let sample = match self.tracker.accept(&pv) {
            Ok(sample) => sample,
            Err(failed) => return failed,
        };
        let at = pv.timestamp();

        let (diff, signal) = match (self.last_output, self.last_sample) {
            (Some(_), Some(last_sample)) => {
                let diff = sample - last_sample;
                if diff != 0.0 || self.baseline.is_none() {
                    self.baseline = Some(Baseline {
                        start: at,
                        value: self.value_at(at) + diff,
                    });
                }
                let baseline = self.baseline.unwrap_or(Baseline { start: at, value: 0.0 });
                (diff, self.decay(baseline, at))
            }
            _ => (0.0, 0.0),
        };

        self.last_sample = Some(sample);
        self.last_output = Some(signal);

        pv.derive(Some(ControlStatus {
            setpoint: 0.0,
            error: diff,
            signal,
        }))
    }
}

impl<P: Clone> hc_signal::SignalProcessor<f64, ControlStatus, P> for HalfLifeController<P> {
    fn process(&mut self, signal: Signal<f64, P>) -> Option<Signal<ControlStatus, P>> {
        Some(self.compute(signal))
    }
}
