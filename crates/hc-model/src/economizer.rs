//! Economizer: free heating or cooling from ambient air.
//!
//! Indoor and ambient temperatures are combined into one signal that is positive
//! while running the economizer makes sense. That signal goes through a PI
//! controller and a hysteresis renderer, and the on/off result drives the
//! economizer's own HVAC device. While the economizer runs, the zone it serves
//! stops calling for the main unit unless `keep_hvac_on` is set.

use std::sync::Arc;
use std::time::Duration;

use hc_controls::{ControlOutput, HysteresisController, PidConfig, PidController, ProcessController};
use hc_core::{plus, Clock, SystemClock, Timestamp};
use hc_signal::{Signal, SignalError};

use crate::error::{ModelError, ModelResult};
use crate::hvac::{HvacCommand, HvacDevice, HvacMode};
use crate::settings::EconomizerSettings;
use crate::status::{CallingStatus, EconomizerStatus, ZoneStatus};

/// Inputs older than this are considered stale.
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(90);

pub struct Economizer {
    name: String,
    settings: EconomizerSettings,
    device: Box<dyn HvacDevice>,
    stale_timeout: Duration,
    clock: Arc<dyn Clock>,
    controller: PidController,
    renderer: HysteresisController,
    indoor: Option<Signal<f64>>,
    ambient: Option<Signal<f64>>,
    active: Option<bool>,
    status: EconomizerStatus,
    closed: bool,
}

impl std::fmt::Debug for Economizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Economizer")
            .field("name", &self.name)
            .field("device", &self.device.address())
            .field("settings", &self.settings)
            .field("active", &self.active)
            .finish()
    }
}

impl Economizer {
    pub fn new(
        name: impl Into<String>,
        settings: EconomizerSettings,
        device: Box<dyn HvacDevice>,
    ) -> ModelResult<Self> {
        let name = name.into();
        settings.validate()?;
        check_mode(settings.mode, device.as_ref())?;

        let controller = PidController::new(format!("(economizer) {name}"), 0.0, pid_config(&settings))?;
        let renderer = HysteresisController::new(format!("(economizer renderer) {name}"), 0.0)?;

        tracing::info!(economizer = %name, device = %device.address(), ?settings, "created");

        let status = EconomizerStatus {
            settings: Some(settings.clone()),
            sample: None,
            demand: 0.0,
            active: None,
            ambient: None,
        };

        Ok(Self {
            name,
            settings,
            device,
            stale_timeout: DEFAULT_STALE_TIMEOUT,
            clock: Arc::new(SystemClock),
            controller,
            renderer,
            indoor: None,
            ambient: None,
            active: None,
            status,
            closed: false,
        })
    }

    pub fn with_stale_timeout(mut self, timeout: Duration) -> Self {
        self.stale_timeout = timeout;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &EconomizerSettings {
        &self.settings
    }

    pub fn status(&self) -> &EconomizerStatus {
        &self.status
    }

    /// `true` while the device is being told to run.
    pub fn is_active(&self) -> bool {
        self.active == Some(true)
    }

    /// Replace the policy. Mode changes must still be supported by the device.
    ///
    /// New P, I or limit values replace the controller, dropping its integral.
    pub fn set_settings(&mut self, settings: EconomizerSettings) -> ModelResult<()> {
        settings.validate()?;
        check_mode(settings.mode, self.device.as_ref())?;
        let current = self.controller.config();
        if current.p != settings.p || current.i != settings.i || current.saturation_limit != settings.saturation_limit {
            self.controller = PidController::new(format!("(economizer) {}", self.name), 0.0, pid_config(&settings))?;
        }
        tracing::info!(economizer = %self.name, ?settings, "settings changed");
        self.status.settings = Some(settings.clone());
        self.settings = settings;
        Ok(())
    }

    /// Record an indoor sample and re-evaluate. Returns the on/off decision.
    pub fn record_indoor<P: Clone>(&mut self, indoor: &Signal<f64, P>) -> ModelResult<bool> {
        self.indoor = Some(indoor.clone().with_payload_of(None));
        self.evaluate()
    }

    /// Record an ambient sample and re-evaluate. Returns the on/off decision.
    pub fn record_ambient(&mut self, ambient: Signal<f64>) -> ModelResult<bool> {
        self.status.ambient = ambient.value().copied();
        self.ambient = Some(ambient);
        self.evaluate()
    }

    fn evaluate(&mut self) -> ModelResult<bool> {
        if self.closed {
            return Err(ModelError::DeviceClosed {
                address: self.device.address().to_string(),
            });
        }

        let combined = self.combined();

        // Positive combined signal is demand; with error = setpoint - pv the sign flips.
        let control = self.controller.compute(combined.clone().map_value(|v| -v));
        let input = match control.value() {
            Some(status) if control.is_ok() => Signal::ok(control.timestamp(), status.signal()),
            // Anything unusable means "off".
            _ => {
                tracing::debug!(economizer = %self.name, signal = %combined, "turning off on bad input");
                Signal::ok(control.timestamp(), -1.0)
            }
        };
        let demand = input.value().copied().unwrap_or(-1.0);

        let rendered = self.renderer.compute(input);
        let on = rendered.value().is_some_and(|r| r.is_on());

        self.status = EconomizerStatus {
            settings: Some(self.settings.clone()),
            sample: rendered.value().map(|r| r.sample),
            demand,
            active: Some(on),
            ambient: self.status.ambient,
        };

        if self.active != Some(on) {
            tracing::info!(economizer = %self.name, from = ?self.active, to = on, "state change");
            self.active = Some(on);
            self.apply(on)?;
        }
        Ok(on)
    }

    fn apply(&mut self, on: bool) -> ModelResult<()> {
        let ctl = if on { 1.0 } else { 0.0 };
        let command = HvacCommand::new(Some(self.settings.mode), Some(ctl), Some(ctl));
        let status = self.device.apply(command)?;
        tracing::debug!(economizer = %self.name, ?status, "device updated");
        Ok(())
    }

    fn combined(&mut self) -> Signal<f64> {
        let now = self.clock.now();

        if !self.settings.enabled {
            tracing::trace!(economizer = %self.name, "disabled");
            return Signal::ok(now, 0.0);
        }

        let (Some(indoor), Some(ambient)) = (&self.indoor, &self.ambient) else {
            tracing::debug!(economizer = %self.name, "incomplete inputs");
            return Signal::failure(now, SignalError::Upstream("indoor or ambient missing".into()));
        };

        let (indoor_t, ambient_t) = match (usable(indoor), usable(ambient)) {
            (Some(i), Some(a)) => (i, a),
            _ => {
                let error = indoor
                    .error()
                    .or(ambient.error())
                    .cloned()
                    .unwrap_or(SignalError::Upstream("indoor or ambient unusable".into()));
                tracing::warn!(economizer = %self.name, %error, "error inputs");
                return Signal::failure(now, error);
            }
        };

        if is_stale(indoor.timestamp(), now, self.stale_timeout)
            || is_stale(ambient.timestamp(), now, self.stale_timeout)
        {
            tracing::error!(
                economizer = %self.name,
                indoor = %indoor.timestamp(),
                ambient = %ambient.timestamp(),
                "stale inputs, resetting both"
            );
            self.indoor = None;
            self.ambient = None;
            return Signal::ok(now, -1.0);
        }

        let at = indoor.timestamp().max(ambient.timestamp());
        Signal::ok(at, self.signal(indoor_t, ambient_t))
    }

    /// Combined indoor/ambient signal; positive means the economizer should run.
    pub fn signal(&self, indoor: f64, ambient: f64) -> f64 {
        let delta = self.settings.changeover_delta;
        let ambient_delta = self.ambient_delta(indoor, ambient);
        let target_delta = self.target_delta(indoor);

        let adjustment = if target_delta > delta || ambient_delta < 0.0 {
            0.0
        } else {
            // Closing in on the target; back off proportionally.
            let k = if delta == 0.0 {
                1.0
            } else {
                (delta - target_delta) / delta
            };
            ambient_delta * k
        };

        let signal = ambient_delta - adjustment;
        tracing::debug!(economizer = %self.name, ambient_delta, target_delta, signal, "combined");
        signal
    }

    /// Positive when ambient air is on the useful side of indoor by more than the changeover delta.
    fn ambient_delta(&self, indoor: f64, ambient: f64) -> f64 {
        let delta = self.settings.changeover_delta;
        match self.settings.mode {
            HvacMode::Cooling => indoor - (ambient + delta),
            _ => ambient - (indoor + delta),
        }
    }

    /// Positive while indoor has not reached the target yet.
    fn target_delta(&self, indoor: f64) -> f64 {
        let target = self.settings.target_temperature;
        match self.settings.mode {
            HvacMode::Cooling => indoor - target,
            _ => target - indoor,
        }
    }

    /// Attach the economizer status to a zone status, and stop the zone from
    /// calling while the economizer runs.
    pub fn suppress<P: std::fmt::Debug>(&self, source: Signal<ZoneStatus, P>) -> Signal<ZoneStatus, P> {
        if source.is_error() {
            tracing::warn!(economizer = %self.name, signal = ?source, "error signal reached suppression");
            return source;
        }

        let suppress = self.is_active() && !self.settings.keep_hvac_on;
        let status = self.status.clone();

        source.map_value(|zone| ZoneStatus {
            calling: if suppress { CallingStatus::IDLE } else { zone.calling },
            economizer: Some(status),
            ..zone
        })
    }

    /// Turn the device off and release it. Idempotent.
    pub fn close(&mut self) -> ModelResult<()> {
        if self.closed {
            return Ok(());
        }
        tracing::warn!(economizer = %self.name, "shutting down");
        self.closed = true;
        let off = self.apply(false);
        let closed = self.device.close();
        self.active = Some(false);
        off.and(closed)
    }
}

fn pid_config(settings: &EconomizerSettings) -> PidConfig {
    PidConfig::new(settings.p, settings.i, 0.0, settings.saturation_limit)
}

fn check_mode(mode: HvacMode, device: &dyn HvacDevice) -> ModelResult<()> {
    if device.supports(mode) {
        Ok(())
    } else {
        Err(ModelError::UnsupportedMode {
            device: device.address().to_string(),
            mode,
        })
    }
}

fn usable(signal: &Signal<f64>) -> Option<f64> {
    if signal.is_error() {
        None
    } else {
        signal.value().copied().filter(|v| v.is_finite())
    }
}

fn is_stale(at: Timestamp, now: Timestamp, timeout: Duration) -> bool {
    plus(at, timeout) < now
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hvac::SwitchableHvacDevice;
    use crate::settings::ZoneSettings;
    use crate::switch::{NullSwitch, Switch};
    use chrono::{TimeZone, Utc};
    use hc_core::ManualClock;

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap() + chrono::Duration::seconds(secs)
    }

    fn settings() -> EconomizerSettings {
        EconomizerSettings {
            // Plain proportional control keeps the arithmetic readable.
            i: 0.0,
            saturation_limit: 0.0,
            ..EconomizerSettings::new(HvacMode::Cooling, 1.0, 22.0)
        }
    }

    fn economizer(settings: EconomizerSettings) -> (Economizer, NullSwitch, ManualClock) {
        let switch = NullSwitch::new("fan");
        let device = SwitchableHvacDevice::new("fan", HvacMode::Cooling, Box::new(switch.clone()), false);
        let clock = ManualClock::new(t(0));
        let eco = Economizer::new("zone", settings, Box::new(device))
            .unwrap()
            .with_clock(Arc::new(clock.clone()));
        (eco, switch, clock)
    }

    #[test]
    fn device_must_support_mode() {
        let device = SwitchableHvacDevice::new("heater", HvacMode::Heating, Box::new(NullSwitch::new("r")), false);
        assert!(matches!(
            Economizer::new("zone", settings(), Box::new(device)),
            Err(ModelError::UnsupportedMode { .. })
        ));
    }

    #[test]
    fn combined_signal_cooling() {
        let (eco, _, _) = economizer(settings());
        // Far above target, ambient much cooler: plain ambient delta.
        assert_eq!(eco.signal(30.0, 20.0), 9.0);
        // Ambient too warm.
        assert_eq!(eco.signal(30.0, 29.5), -0.5);
        // Within the changeover delta of the target: scaled back.
        assert!((eco.signal(22.5, 15.0) - 6.5 * 0.5).abs() < 1e-9);
        // At the target.
        assert_eq!(eco.signal(22.0, 15.0), 0.0);
    }

    #[test]
    fn combined_signal_heating() {
        let (mut eco, _, _) = economizer(settings());
        let heating = EconomizerSettings::new(HvacMode::Heating, 1.0, 22.0);
        assert!(eco.set_settings(heating).is_err());

        let device = crate::hvac::VariableHvacDevice::new("hp", [HvacMode::Heating]).unwrap();
        let eco = Economizer::new("zone", EconomizerSettings::new(HvacMode::Heating, 1.0, 22.0), Box::new(device)).unwrap();
        // Ambient 25, indoor 18: 25 - (18 + 1).
        assert_eq!(eco.signal(18.0, 25.0), 6.0);
    }

    #[test]
    fn new_gains_replace_controller() {
        let (mut eco, _, _) = economizer(settings());
        assert_eq!(eco.controller.config().p, 1.0);

        eco.set_settings(EconomizerSettings {
            p: 2.5,
            ..settings()
        })
        .unwrap();
        assert_eq!(eco.controller.config().p, 2.5);
        assert_eq!(eco.settings().p, 2.5);
    }

    #[test]
    fn turns_on_and_off_with_ambient() {
        let (mut eco, switch, _) = economizer(settings());
        assert!(!eco.record_indoor(&Signal::<f64>::ok(t(0), 28.0)).unwrap());
        assert_eq!(switch.state().unwrap(), Some(false));

        assert!(eco.record_ambient(Signal::ok(t(0), 20.0)).unwrap());
        assert!(eco.is_active());
        assert_eq!(switch.state().unwrap(), Some(true));
        assert_eq!(eco.status().ambient, Some(20.0));

        assert!(!eco.record_ambient(Signal::ok(t(0), 29.0)).unwrap());
        assert_eq!(switch.state().unwrap(), Some(false));
    }

    #[test]
    fn error_inputs_turn_it_off() {
        let (mut eco, switch, _) = economizer(settings());
        eco.record_indoor(&Signal::<f64>::ok(t(0), 28.0)).unwrap();
        assert!(eco.record_ambient(Signal::ok(t(0), 20.0)).unwrap());
        let on = eco
            .record_ambient(Signal::failure(t(0), SignalError::DeviceAbsent { address: "out".into() }))
            .unwrap();
        assert!(!on);
        assert_eq!(switch.state().unwrap(), Some(false));
    }

    #[test]
    fn stale_inputs_reset() {
        let (mut eco, _, clock) = economizer(settings());
        eco.record_indoor(&Signal::<f64>::ok(t(0), 28.0)).unwrap();
        assert!(eco.record_ambient(Signal::ok(t(0), 20.0)).unwrap());

        clock.advance(Duration::from_secs(120));
        assert!(!eco.record_indoor(&Signal::<f64>::ok(t(120), 28.0)).unwrap());

        // Both inputs were dropped; one fresh sample is not enough.
        assert!(!eco.record_indoor(&Signal::<f64>::ok(t(121), 28.0)).unwrap());
    }

    #[test]
    fn disabled_never_runs() {
        let (mut eco, _, _) = economizer(EconomizerSettings {
            enabled: false,
            ..settings()
        });
        eco.record_indoor(&Signal::<f64>::ok(t(0), 30.0)).unwrap();
        assert!(!eco.record_ambient(Signal::ok(t(0), 10.0)).unwrap());
    }

    fn calling_zone() -> Signal<ZoneStatus, String> {
        Signal::ok(
            t(0),
            ZoneStatus {
                settings: ZoneSettings::new(22.0),
                calling: CallingStatus {
                    sample: Some(28.0),
                    demand: 1.0,
                    calling: true,
                },
                economizer: None,
                period: None,
            },
        )
        .with_payload("zone".to_string())
    }

    #[test]
    fn suppresses_zone_while_active() {
        let (mut eco, _, _) = economizer(settings());
        let passed = eco.suppress(calling_zone());
        assert!(passed.value().unwrap().calling.calling);
        assert!(passed.value().unwrap().economizer.is_some());

        eco.record_indoor(&Signal::<f64>::ok(t(0), 28.0)).unwrap();
        eco.record_ambient(Signal::ok(t(0), 20.0)).unwrap();
        let suppressed = eco.suppress(calling_zone());
        assert_eq!(suppressed.value().unwrap().calling, CallingStatus::IDLE);
        assert_eq!(suppressed.payload().map(String::as_str), Some("zone"));
    }

    #[test]
    fn keep_hvac_on_does_not_suppress() {
        let (mut eco, _, _) = economizer(EconomizerSettings {
            keep_hvac_on: true,
            ..settings()
        });
        eco.record_indoor(&Signal::<f64>::ok(t(0), 28.0)).unwrap();
        eco.record_ambient(Signal::ok(t(0), 20.0)).unwrap();
        assert!(eco.suppress(calling_zone()).value().unwrap().calling.calling);
    }

    #[test]
    fn close_turns_device_off() {
        let (mut eco, switch, _) = economizer(settings());
        eco.record_indoor(&Signal::<f64>::ok(t(0), 28.0)).unwrap();
        eco.record_ambient(Signal::ok(t(0), 20.0)).unwrap();
        eco.close().unwrap();
        eco.close().unwrap();
        assert_eq!(switch.state().unwrap(), Some(false));
        assert!(eco.record_indoor(&Signal::<f64>::ok(t(1), 28.0)).is_err());
    }
}
