//! The process controller contract and the state every controller shares.

use hc_core::Timestamp;
use hc_signal::Signal;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};

/// Setpoint, error and output of one controller step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlStatus {
    pub setpoint: f64,
    pub error: f64,
    pub signal: f64,
}

/// Anything a controller emits exposes its basic status.
pub trait ControlOutput {
    fn status(&self) -> &ControlStatus;

    fn signal(&self) -> f64 {
        self.status().signal
    }
}

impl ControlOutput for ControlStatus {
    fn status(&self) -> &ControlStatus {
        self
    }
}

/// Stateful controller driven by process variable samples.
///
/// Each instance belongs to exactly one pipeline; nothing here is shared.
pub trait ProcessController<P = ()> {
    type Output: ControlOutput + Clone;

    /// Name used in logs.
    fn name(&self) -> &str;

    fn setpoint(&self) -> f64;

    /// Change the setpoint.
    ///
    /// If a process variable has been seen, the output is recomputed against it
    /// right away and returned, so a setpoint change is visible without waiting
    /// for the next sample.
    fn set_setpoint(&mut self, setpoint: f64) -> ControlResult<Option<Signal<Self::Output, P>>>;

    /// Last process variable sample accepted, if any.
    fn process_variable(&self) -> Option<&Signal<f64, P>>;

    /// `setpoint - process_variable`, or 0 before the first sample.
    fn error(&self) -> f64 {
        match self.process_variable().and_then(|pv| pv.value()) {
            Some(pv) => self.setpoint() - pv,
            None => 0.0,
        }
    }

    /// Feed one sample.
    ///
    /// Failed samples yield a failed output and leave the controller state alone.
    fn compute(&mut self, pv: Signal<f64, P>) -> Signal<Self::Output, P>;
}

/// Bookkeeping shared by all controllers: name, setpoint, last sample.
#[derive(Debug, Clone)]
pub(crate) struct Tracker<P> {
    pub name: String,
    pub setpoint: f64,
    pub pv: Option<Signal<f64, P>>,
    last_output_at: Option<Timestamp>,
}

impl<P: Clone> Tracker<P> {
    pub fn new(name: impl Into<String>, setpoint: f64) -> ControlResult<Self> {
        let name = name.into();
        check_setpoint(&name, setpoint)?;
        Ok(Self {
            name,
            setpoint,
            pv: None,
            last_output_at: None,
        })
    }

    pub fn set_setpoint(&mut self, setpoint: f64) -> ControlResult<()> {
        check_setpoint(&self.name, setpoint)?;
        self.setpoint = setpoint;
        Ok(())
    }

    /// Screen an incoming sample.
    ///
    /// Returns the sample value if the controller should act on it, or the failed
    /// output to emit instead.
    pub fn accept<O>(&mut self, pv: &Signal<f64, P>) -> Result<f64, Signal<O, P>> {
        let value = match pv.value() {
            Some(v) if !pv.is_error() => *v,
            _ => return Err(pv.derive(None)),
        };

        if let Some(last) = self.last_output_at {
            if last > pv.timestamp() {
                tracing::warn!(
                    controller = %self.name,
                    last = %last,
                    now = %pv.timestamp(),
                    "sample out of order"
                );
            }
        }

        self.pv = Some(pv.clone());
        self.last_output_at = Some(pv.timestamp());
        Ok(value)
    }
}

fn check_setpoint(name: &str, setpoint: f64) -> ControlResult<()> {
    if setpoint.is_finite() {
        Ok(())
    } else {
        Err(ControlError::InvalidSetpoint {
            controller: name.to_string(),
            value: setpoint,
        })
    }
}
