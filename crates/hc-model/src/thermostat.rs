//! Thermostat: temperature samples in, calling decisions out.
//!
//! The pipeline is
//!
//! ```text
//! sample -> (minus sensitivity adjustment) -> PID -> hysteresis renderer -> ThermostatStatus
//! ```
//!
//! The PID gains define the operating mode. With `error = setpoint - temperature`,
//! a positive `p` heats and a negative `p` cools. The renderer sits at setpoint 0
//! with a band of ±1, so the thermostat calls once the PID output reaches 1 and
//! stops once it falls to -1.

use std::sync::Arc;
use std::time::Duration;

use hc_controls::{
    ControlOutput, HalfLifeController, HysteresisController, PidConfig, PidController, PidStatus,
    ProcessController, DEFAULT_HYSTERESIS,
};
use hc_core::{clamp_unit, Clock, SystemClock, Timestamp};
use hc_signal::{Signal, SignalError, SignalProcessor, Status};

use crate::error::{ModelError, ModelResult};
use crate::settings::SetpointRange;
use crate::status::{CallingStatus, ThermostatStatus};

/// How trigger-happy a thermostat is right after a setpoint change.
///
/// A setpoint step is fed into a half-life controller; its decaying output, times
/// `multiplier`, is subtracted from every sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sensitivity {
    pub half_life: Duration,
    pub multiplier: f64,
}

pub struct Thermostat {
    name: String,
    range: SetpointRange,
    controller: PidController,
    sensitivity: Option<(HalfLifeController, f64)>,
    renderer: HysteresisController<PidStatus>,
    clock: Arc<dyn Clock>,
    last_good: Option<f64>,
}

impl std::fmt::Debug for Thermostat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thermostat")
            .field("name", &self.name)
            .field("range", &self.range)
            .field("setpoint", &self.setpoint())
            .field("config", self.controller.config())
            .field("calling", &self.renderer.is_on())
            .finish()
    }
}

impl Thermostat {
    pub fn new(
        name: impl Into<String>,
        range: SetpointRange,
        setpoint: f64,
        pid: PidConfig,
    ) -> ModelResult<Self> {
        let name = name.into();
        check_range(&name, &range, setpoint)?;

        let controller = PidController::new(format!("(controller) {name}"), setpoint, pid)?;
        let renderer = HysteresisController::new(format!("(renderer) {name}"), 0.0)?;

        tracing::debug!(thermostat = %name, setpoint, ?range, "created");

        Ok(Self {
            name,
            range,
            controller,
            sensitivity: None,
            renderer,
            clock: Arc::new(SystemClock),
            last_good: None,
        })
    }

    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> ModelResult<Self> {
        if !(sensitivity.multiplier > 0.0) || !sensitivity.multiplier.is_finite() {
            return Err(ModelError::InvalidArg {
                what: "sensitivity multiplier must be positive",
            });
        }
        let controller =
            HalfLifeController::new(format!("(sensitivity) {}", self.name), sensitivity.half_life)?;
        self.sensitivity = Some((controller, sensitivity.multiplier));
        Ok(self)
    }

    /// Clock used to stamp [`Thermostat::raise`] signals.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> SetpointRange {
        self.range
    }

    pub fn setpoint(&self) -> f64 {
        self.controller.setpoint()
    }

    pub fn is_calling(&self) -> bool {
        self.renderer.is_on()
    }

    pub fn set_setpoint(&mut self, setpoint: f64) -> ModelResult<()> {
        check_range(&self.name, &self.range, setpoint)?;
        // The controller replays its last sample; the zone replays the full pipeline.
        self.controller.set_setpoint(setpoint)?;
        tracing::info!(thermostat = %self.name, setpoint, "setpoint changed");
        Ok(())
    }

    /// Feed one temperature sample.
    ///
    /// Partial failures are masked: the value they carry (or the last good one)
    /// is used and the output is healthy, with the masked error attached.
    /// Total failures come out as total failures.
    pub fn compute(&mut self, pv: Signal<f64>) -> Signal<ThermostatStatus> {
        let at = pv.timestamp();

        let (sample, masked) = match (pv.status(), pv.value().copied()) {
            (Status::FailureTotal, _) => return pv.derive(None),
            (Status::Ok, Some(v)) if v.is_finite() => (v, None),
            (Status::Ok, _) => {
                tracing::warn!(thermostat = %self.name, signal = %pv, "non-finite sample");
                return Signal::failure(
                    at,
                    SignalError::Malformed {
                        what: "non-finite temperature".into(),
                    },
                );
            }
            (Status::FailurePartial, value) => {
                let error = pv.error().cloned().unwrap_or(SignalError::Upstream("partial failure".into()));
                match value.filter(|v| v.is_finite()).or(self.last_good) {
                    Some(v) => {
                        tracing::debug!(thermostat = %self.name, %error, sample = v, "masking partial failure");
                        (v, Some(error))
                    }
                    None => return Signal::failure(at, error),
                }
            }
        };
        self.last_good = Some(sample);

        let adjusted = sample - self.adjustment(at);

        let control = self.controller.compute(Signal::ok(at, adjusted));
        let Some(control) = control.into_value() else {
            return Signal::failure(
                at,
                SignalError::Malformed {
                    what: "controller produced no output".into(),
                },
            );
        };
        tracing::trace!(thermostat = %self.name, sample, adjusted, ?control, "controller");

        let rendered = self
            .renderer
            .compute(Signal::ok(at, control.signal()).with_payload(control));
        self.status(at, rendered, masked)
    }

    /// Reconsider the calling decision now.
    ///
    /// A thermostat that is not calling but sits inside the hysteresis band gets
    /// nudged into calling, e.g. because the unit is starting anyway. Anything
    /// else is left alone, and `None` is returned.
    pub fn raise(&mut self) -> Option<Signal<ThermostatStatus>> {
        let actual = self.renderer.process_variable()?.clone();
        let value = *actual.value()?;

        if !(-DEFAULT_HYSTERESIS..DEFAULT_HYSTERESIS).contains(&value) {
            return None;
        }

        let now = self.clock.now();
        let mut nudge = Signal::ok(now, DEFAULT_HYSTERESIS);
        if let Some(payload) = actual.payload() {
            nudge = nudge.with_payload(*payload);
        }
        tracing::debug!(thermostat = %self.name, from = value, "raise");

        let rendered = self.renderer.compute(nudge);
        Some(self.status(now, rendered, None))
    }

    fn adjustment(&mut self, at: Timestamp) -> f64 {
        let setpoint = self.controller.setpoint();
        match &mut self.sensitivity {
            Some((controller, multiplier)) => {
                let out = controller.compute(Signal::ok(at, setpoint));
                out.value().map(|s| s.signal * *multiplier).unwrap_or(0.0)
            }
            None => 0.0,
        }
    }

    fn status(
        &self,
        at: Timestamp,
        rendered: Signal<hc_controls::HysteresisStatus, PidStatus>,
        masked: Option<SignalError>,
    ) -> Signal<ThermostatStatus> {
        let (Some(render), Some(control)) = (rendered.value(), rendered.payload()) else {
            return rendered.derive(None).with_payload_of(None);
        };

        let low = self.renderer.threshold_low();
        let high = self.renderer.threshold_high();

        Signal::ok(
            at,
            ThermostatStatus {
                setpoint: control.base.setpoint,
                error: control.base.error,
                calling: CallingStatus {
                    sample: self.last_good,
                    demand: clamp_unit((control.signal() - low) / (high - low)),
                    calling: render.is_on(),
                },
                masked,
            },
        )
    }
}

impl SignalProcessor<f64, ThermostatStatus> for Thermostat {
    fn process(&mut self, signal: Signal<f64>) -> Option<Signal<ThermostatStatus>> {
        Some(self.compute(signal))
    }
}

fn check_range(name: &str, range: &SetpointRange, setpoint: f64) -> ModelResult<()> {
    if range.contains(setpoint) {
        Ok(())
    } else {
        Err(ModelError::SetpointOutOfRange {
            zone: name.to_string(),
            setpoint,
            min: range.min,
            max: range.max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use hc_core::ManualClock;

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap() + chrono::Duration::seconds(secs)
    }

    /// Heating thermostat, proportional only.
    fn heating() -> Thermostat {
        Thermostat::new("ts", SetpointRange::default(), 20.0, PidConfig::new(1.0, 0.0, 0.0, 0.0)).unwrap()
    }

    fn calling(ts: &mut Thermostat, secs: i64, v: f64) -> bool {
        ts.compute(Signal::ok(t(secs), v)).value().unwrap().calling.calling
    }

    #[test]
    fn setpoint_outside_range_rejected() {
        assert!(matches!(
            Thermostat::new("ts", SetpointRange::default(), 50.0, PidConfig::new(1.0, 0.0, 0.0, 0.0)),
            Err(ModelError::SetpointOutOfRange { .. })
        ));
        let mut ts = heating();
        assert!(ts.set_setpoint(5.0).is_err());
        assert_eq!(ts.setpoint(), 20.0);
    }

    #[test]
    fn heating_hysteresis() {
        let mut ts = heating();
        assert!(!calling(&mut ts, 0, 20.0));
        assert!(!calling(&mut ts, 1, 19.5));
        assert!(calling(&mut ts, 2, 19.0));
        assert!(calling(&mut ts, 3, 20.5));
        assert!(!calling(&mut ts, 4, 21.0));
    }

    #[test]
    fn cooling_uses_negative_gain() {
        let mut ts =
            Thermostat::new("ts", SetpointRange::default(), 24.0, PidConfig::new(-1.0, 0.0, 0.0, 0.0)).unwrap();
        assert!(!calling(&mut ts, 0, 24.0));
        assert!(calling(&mut ts, 1, 25.0));
        assert!(!calling(&mut ts, 2, 23.0));
    }

    #[test]
    fn demand_is_normalized() {
        let mut ts = heating();
        let status = ts.compute(Signal::ok(t(0), 20.0)).into_value().unwrap();
        assert_eq!(status.calling.demand, 0.5);
        assert_eq!(status.calling.sample, Some(20.0));
        let status = ts.compute(Signal::ok(t(1), 15.0)).into_value().unwrap();
        assert_eq!(status.calling.demand, 1.0);
        assert_eq!(status.error, 5.0);
    }

    #[test]
    fn partial_failure_is_masked() {
        let mut ts = heating();
        calling(&mut ts, 0, 18.0);

        let error = SignalError::Stale {
            what: "sensor".into(),
        };
        let out = ts.compute(Signal::partial(t(1), None, error.clone()));
        assert!(out.is_ok());
        let status = out.into_value().unwrap();
        assert_eq!(status.masked, Some(error.clone()));
        assert_eq!(status.calling.sample, Some(18.0));
        assert!(status.calling.calling);

        let out = ts.compute(Signal::partial(t(2), Some(22.0), error));
        assert!(out.is_ok());
        assert!(!out.value().unwrap().calling.calling);
    }

    #[test]
    fn partial_failure_without_history_fails() {
        let mut ts = heating();
        let out = ts.compute(Signal::partial(t(0), None, SignalError::Upstream("x".into())));
        assert!(out.is_error());
    }

    #[test]
    fn total_failure_propagates() {
        let mut ts = heating();
        calling(&mut ts, 0, 18.0);
        let out = ts.compute(Signal::failure(
            t(1),
            SignalError::DeviceAbsent {
                address: "28-0000".into(),
            },
        ));
        assert!(out.is_error());
        assert!(out.value().is_none());
        assert!(ts.is_calling());
    }

    #[test]
    fn non_finite_sample_fails() {
        let mut ts = heating();
        assert!(ts.compute(Signal::ok(t(0), f64::NAN)).is_error());
    }

    #[test]
    fn raise_nudges_inside_band() {
        let clock = ManualClock::new(t(10));
        let mut ts = heating().with_clock(Arc::new(clock.clone()));
        assert!(ts.raise().is_none());

        assert!(!calling(&mut ts, 0, 19.5));
        let raised = ts.raise().expect("inside the band");
        assert!(raised.value().unwrap().calling.calling);
        assert_eq!(raised.timestamp(), t(10));

        // Already calling, nothing to do.
        assert!(ts.raise().is_none());
    }

    #[test]
    fn raise_ignored_below_band() {
        let mut ts = heating();
        assert!(!calling(&mut ts, 0, 22.0));
        assert!(ts.raise().is_none());
    }

    #[test]
    fn sensitivity_requires_positive_multiplier() {
        let s = Sensitivity {
            half_life: Duration::from_secs(60),
            multiplier: 0.0,
        };
        assert!(heating().with_sensitivity(s).is_err());
    }

    #[test]
    fn sensitivity_amplifies_setpoint_step() {
        let s = Sensitivity {
            half_life: Duration::from_secs(600),
            multiplier: 1.0,
        };
        let mut plain = heating();
        let mut sensitive = heating().with_sensitivity(s).unwrap();
        assert!(!calling(&mut plain, 0, 20.0));
        assert!(!calling(&mut sensitive, 0, 20.0));

        plain.set_setpoint(20.5).unwrap();
        sensitive.set_setpoint(20.5).unwrap();

        // Half a degree is inside the band on its own.
        let status = plain.compute(Signal::ok(t(1), 20.0)).into_value().unwrap();
        assert!(!status.calling.calling);

        // The fresh step is counted twice while it has not decayed.
        let status = sensitive.compute(Signal::ok(t(1), 20.0)).into_value().unwrap();
        assert!((status.error - 1.0).abs() < 1e-6);
        assert!(status.calling.calling);
    }
}
