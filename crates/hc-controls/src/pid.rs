//! PID controller with anti-windup.
//!
//! Output is `P * e + I * integral(e) + D * de/dt` with `e = setpoint - pv` and
//! time in milliseconds. With a non-zero saturation limit the integral is only
//! advanced while the previous output stayed inside the limit, and a new integral
//! contribution is only accepted if it stays inside the limit too.

use hc_core::Timestamp;
use hc_signal::Signal;
use serde::{Deserialize, Serialize};

use crate::controller::{ControlOutput, ControlStatus, ProcessController, Tracker};
use crate::error::{ControlError, ControlResult};
use crate::strategy::{DerivativeStrategy, IntegralKind, IntegralStrategy, SimpleDerivative};

/// PID gains and policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidConfig {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    /// Absolute output limit for anti-windup; 0 disables it.
    #[serde(default)]
    pub saturation_limit: f64,
    /// Drop accumulated integral and derivative history on setpoint change.
    #[serde(default = "default_reset")]
    pub reset_on_setpoint_change: bool,
    #[serde(default)]
    pub integral: IntegralKind,
}

fn default_reset() -> bool {
    true
}

impl PidConfig {
    pub fn new(p: f64, i: f64, d: f64, saturation_limit: f64) -> Self {
        Self {
            p,
            i,
            d,
            saturation_limit,
            reset_on_setpoint_change: true,
            integral: IntegralKind::Simple,
        }
    }

    pub fn validate(&self) -> ControlResult<()> {
        if !(self.p.is_finite() && self.i.is_finite() && self.d.is_finite()) {
            return Err(ControlError::InvalidArg {
                what: "PID gains must be finite",
            });
        }
        if self.p == 0.0 && self.i == 0.0 && self.d == 0.0 {
            return Err(ControlError::InvalidArg {
                what: "all PID gains are zero",
            });
        }
        if !(self.saturation_limit >= 0.0) {
            return Err(ControlError::InvalidArg {
                what: "saturation limit must be non-negative",
            });
        }
        Ok(())
    }
}

/// PID output with the individual term contributions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidStatus {
    pub base: ControlStatus,
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

impl ControlOutput for PidStatus {
    fn status(&self) -> &ControlStatus {
        &self.base
    }
}

/// PID controller over `f64` process variable samples.
#[derive(Debug)]
pub struct PidController<P = ()> {
    tracker: Tracker<P>,
    config: PidConfig,
    integral: Box<dyn IntegralStrategy>,
    derivative: Box<dyn DerivativeStrategy>,
    last_signal: Option<f64>,
    last_p: f64,
    last_i: f64,
    last_d: f64,
}

impl<P: Clone> PidController<P> {
    pub fn new(name: impl Into<String>, setpoint: f64, config: PidConfig) -> ControlResult<Self> {
        let integral = config.integral.build();
        Self::with_strategies(name, setpoint, config, integral, Box::new(SimpleDerivative::default()))
    }

    pub fn with_strategies(
        name: impl Into<String>,
        setpoint: f64,
        config: PidConfig,
        integral: Box<dyn IntegralStrategy>,
        derivative: Box<dyn DerivativeStrategy>,
    ) -> ControlResult<Self> {
        config.validate()?;
        let tracker = Tracker::new(name, setpoint)?;
        tracing::debug!(controller = %tracker.name, ?config, "created PID controller");
        Ok(Self {
            tracker,
            config,
            integral,
            derivative,
            last_signal: None,
            last_p: 0.0,
            last_i: 0.0,
            last_d: 0.0,
        })
    }

    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    /// Last integral contribution, `I * integral`.
    pub fn integral_term(&self) -> f64 {
        self.last_i
    }

    fn step(&mut self, at: Timestamp, value: f64) -> PidStatus {
        let limit = self.config.saturation_limit;
        let error = self.tracker.setpoint - value;

        self.last_p = error * self.config.p;

        if limit == 0.0 {
            self.last_i = self.integral.integrate(at, error) * self.config.i;
        } else {
            match self.last_signal {
                Some(last) if last.abs() < limit => {
                    let candidate = self.integral.integrate(at, error) * self.config.i;
                    if candidate.abs() < limit {
                        self.last_i = candidate;
                    }
                }
                // Saturated, or nothing computed yet: keep the integrator's clock moving.
                _ => {
                    self.integral.integrate(at, 0.0);
                }
            }
        }

        let rate = self.derivative.differentiate(at, error);
        self.last_d = if rate.is_finite() {
            rate * self.config.d
        } else {
            0.0
        };

        let signal = self.last_p + self.last_i + self.last_d;
        if signal.is_nan() {
            panic!(
                "{}: PID output is NaN (p={}, i={}, d={}, error={error})",
                self.tracker.name, self.last_p, self.last_i, self.last_d
            );
        }
        self.last_signal = Some(signal);

        PidStatus {
            base: ControlStatus {
                setpoint: self.tracker.setpoint,
                error,
                signal,
            },
            p: self.last_p,
            i: self.last_i,
            d: self.last_d,
        }
    }
}

impl<P: Clone> ProcessController<P> for PidController<P> {
    type Output = PidStatus;

    fn name(&self) -> &str {
        &self.tracker.name
    }

    fn setpoint(&self) -> f64 {
        self.tracker.setpoint
    }

    fn set_setpoint(&mut self, setpoint: f64) -> ControlResult<Option<Signal<PidStatus, P>>> {
        self.tracker.set_setpoint(setpoint)?;
        if self.config.reset_on_setpoint_change {
            self.integral.reset();
            self.derivative.reset();
            self.last_i = 0.0;
        }
        Ok(self.tracker.pv.clone().map(|pv| self.compute(pv)))
    }

    fn process_variable(&self) -> Option<&Signal<f64, P>> {
        self.tracker.pv.as_ref()
    }

    fn compute(&mut self, pv: Signal<f64, P>) -> Signal<PidStatus, P> {
        match self.tracker.accept(&pv) {
            Ok(value) => {
                let status = self.step(pv.timestamp(), value);
                tracing::trace!(controller = %self.tracker.name, ?status, "pid");
                pv.derive(Some(status))
            }
            Err(failed) => failed,
        }
    }
}

impl<P: Clone> hc_signal::SignalProcessor<f64, PidStatus, P> for PidController<P> {
    fn process(&mut self, signal: Signal<f64, P>) -> Option<Signal<PidStatus, P>> {
        Some(self.compute(signal))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn integral_never_exceeds_limit(
            pvs in proptest::collection::vec(10.0f64..30.0, 1..60),
            i in 0.000001f64..0.001,
            limit in 0.5f64..5.0,
        ) {
            let start = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
            let mut c = PidController::<()>::new("prop", 20.0, PidConfig::new(1.0, i, 0.0, limit)).unwrap();
            for (n, pv) in pvs.into_iter().enumerate() {
                let out = c.compute(Signal::ok(start + Duration::seconds(n as i64 * 30), pv));
                prop_assert!(out.value().unwrap().i.abs() <= limit);
            }
        }
    }
}
