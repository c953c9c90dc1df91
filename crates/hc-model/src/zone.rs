//! Zone: a thermostat plus the user's policy for it.
//!
//! A zone owns its thermostat and optional economizer, and emits one
//! [`ZoneStatus`] per temperature sample. The output payload is the zone name.
//!
//! Settings changes replay the last sample through the whole pipeline, so the
//! effect (a disabled zone going quiet, a new setpoint) is visible right away.
//! Before the first sample there is nothing to replay and nothing is emitted.

use hc_signal::{Signal, SignalProcessor};

use crate::economizer::Economizer;
use crate::error::{ModelError, ModelResult};
use crate::settings::{PeriodSettings, SetpointRange, ZoneSettings, ZoneSettingsUpdate};
use crate::status::{CallingStatus, ThermostatStatus, ZoneStatus};
use crate::thermostat::Thermostat;

#[derive(Debug)]
pub struct Zone {
    thermostat: Thermostat,
    settings: ZoneSettings,
    period: Option<PeriodSettings>,
    economizer: Option<Economizer>,
    last_signal: Option<Signal<f64, String>>,
}

impl Zone {
    /// The thermostat is moved to the setpoint in `settings`.
    pub fn new(mut thermostat: Thermostat, settings: ZoneSettings) -> ModelResult<Self> {
        thermostat.set_setpoint(settings.setpoint)?;
        tracing::info!(zone = %thermostat.name(), ?settings, "created");
        Ok(Self {
            thermostat,
            settings,
            period: None,
            economizer: None,
            last_signal: None,
        })
    }

    /// Attach an economizer. Economizer settings already in the zone settings win.
    pub fn with_economizer(mut self, mut economizer: Economizer) -> ModelResult<Self> {
        match &self.settings.economizer {
            Some(settings) => economizer.set_settings(settings.clone())?,
            None => self.settings.economizer = Some(economizer.settings().clone()),
        }
        self.economizer = Some(economizer);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        self.thermostat.name()
    }

    pub fn settings(&self) -> &ZoneSettings {
        &self.settings
    }

    pub fn setpoint_range(&self) -> SetpointRange {
        self.thermostat.range()
    }

    pub fn period(&self) -> Option<&PeriodSettings> {
        self.period.as_ref()
    }

    pub fn economizer(&self) -> Option<&Economizer> {
        self.economizer.as_ref()
    }

    /// Apply a settings update and replay the last sample, if any.
    ///
    /// Nothing changes if the update is rejected.
    pub fn set_settings(
        &mut self,
        update: &ZoneSettingsUpdate,
    ) -> ModelResult<Option<Signal<ZoneStatus, String>>> {
        let mut merged = self.settings.merge(update);

        if let Some(setpoint) = update.setpoint {
            let range = self.thermostat.range();
            if !range.contains(setpoint) {
                return Err(ModelError::SetpointOutOfRange {
                    zone: self.name().to_string(),
                    setpoint,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        if let Some(settings) = &update.economizer {
            match &mut self.economizer {
                Some(economizer) => economizer.set_settings(settings.clone())?,
                None => {
                    tracing::warn!(zone = %self.thermostat.name(), "economizer settings given to a zone without an economizer, dropped");
                    merged.economizer = self.settings.economizer.clone();
                }
            }
        }
        if let Some(setpoint) = update.setpoint {
            self.thermostat.set_setpoint(setpoint)?;
        }

        if !merged.same(&self.settings) {
            tracing::info!(zone = %self.name(), from = ?self.settings, to = ?merged, "settings changed");
        } else {
            tracing::debug!(zone = %self.name(), ?update, "settings unchanged");
        }
        self.settings = merged;

        Ok(self.bump())
    }

    /// Apply schedule period settings, unless the zone is on hold.
    ///
    /// `None` means no period is active; current settings are left alone.
    pub fn set_period(
        &mut self,
        period: Option<PeriodSettings>,
    ) -> ModelResult<Option<Signal<ZoneStatus, String>>> {
        self.period = period.clone();

        let Some(period) = period else {
            tracing::info!(zone = %self.name(), "period cleared");
            return Ok(None);
        };
        if self.settings.hold {
            tracing::debug!(zone = %self.name(), period = %period.period, "on hold, period ignored");
            return Ok(None);
        }

        tracing::info!(zone = %self.name(), period = %period.period, "period started");
        self.set_settings(&period.settings)
    }

    /// Feed one temperature sample.
    pub fn compute(&mut self, signal: Signal<f64, String>) -> Signal<ZoneStatus, String> {
        self.last_signal = Some(signal.clone());
        self.run(signal)
    }

    /// Feed an ambient temperature sample to the economizer, if there is one.
    pub fn record_ambient(&mut self, ambient: Signal<f64>) -> ModelResult<()> {
        if let Some(economizer) = &mut self.economizer {
            economizer.record_ambient(ambient)?;
        }
        Ok(())
    }

    /// Let the thermostat reconsider calling; see [`Thermostat::raise`].
    pub fn raise(&mut self) -> Option<Signal<ZoneStatus, String>> {
        let raised = self.thermostat.raise()?;
        Some(self.finish(raised))
    }

    /// Shut down the economizer, if any.
    pub fn close(&mut self) -> ModelResult<()> {
        tracing::warn!(zone = %self.name(), "shutting down");
        match &mut self.economizer {
            Some(economizer) => economizer.close(),
            None => Ok(()),
        }
    }

    fn bump(&mut self) -> Option<Signal<ZoneStatus, String>> {
        let Some(last) = self.last_signal.clone() else {
            tracing::debug!(zone = %self.name(), "no sample yet, settings apply from the next one");
            return None;
        };
        tracing::debug!(zone = %self.name(), signal = %last, "replaying");
        Some(self.run(last))
    }

    fn run(&mut self, signal: Signal<f64, String>) -> Signal<ZoneStatus, String> {
        if let Some(economizer) = &mut self.economizer {
            // Economizer trouble is logged; the zone keeps going.
            if let Err(e) = economizer.record_indoor(&signal) {
                tracing::warn!(zone = %self.thermostat.name(), error = %e, "economizer failed");
            }
        }

        let status = self.thermostat.compute(signal.with_payload_of(None));
        tracing::trace!(zone = %self.name(), ?status, "thermostat");
        self.finish(status)
    }

    fn finish(&self, status: Signal<ThermostatStatus>) -> Signal<ZoneStatus, String> {
        let enabled = self.settings.enabled;
        let zone = status
            .map_value(|ts| ZoneStatus {
                settings: self.settings.clone(),
                // Disabled zones still run the thermostat, they just don't call.
                calling: if enabled { ts.calling } else { CallingStatus::IDLE },
                economizer: None,
                period: self.period.clone(),
            })
            .with_payload_of(Some(self.name().to_string()));

        match &self.economizer {
            Some(economizer) => economizer.suppress(zone),
            None => zone,
        }
    }
}

impl SignalProcessor<f64, ZoneStatus, String> for Zone {
    fn process(&mut self, signal: Signal<f64, String>) -> Option<Signal<ZoneStatus, String>> {
        Some(self.compute(signal))
    }
}
