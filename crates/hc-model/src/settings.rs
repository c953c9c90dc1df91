//! User-adjustable zone and economizer settings.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::hvac::HvacMode;

/// Closed range of setpoints a thermostat accepts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetpointRange {
    pub min: f64,
    pub max: f64,
}

impl SetpointRange {
    pub fn new(min: f64, max: f64) -> ModelResult<Self> {
        if !(min.is_finite() && max.is_finite()) || min > max {
            return Err(ModelError::InvalidArg {
                what: "setpoint range must be finite with min <= max",
            });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, setpoint: f64) -> bool {
        self.min <= setpoint && setpoint <= self.max
    }
}

impl Default for SetpointRange {
    fn default() -> Self {
        Self {
            min: 10.0,
            max: 40.0,
        }
    }
}

/// Economizer policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomizerSettings {
    /// Which way the economizer moves heat; cooling or heating.
    pub mode: HvacMode,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Temperature difference between indoor and ambient at which the economizer engages.
    pub changeover_delta: f64,
    /// Indoor temperature the economizer stops at.
    pub target_temperature: f64,
    /// Keep the HVAC unit running while the economizer is on.
    #[serde(default)]
    pub keep_hvac_on: bool,
    #[serde(default = "default_economizer_p")]
    pub p: f64,
    #[serde(default = "default_economizer_i")]
    pub i: f64,
    #[serde(default = "default_economizer_limit")]
    pub saturation_limit: f64,
}

fn default_true() -> bool {
    true
}

fn default_economizer_p() -> f64 {
    1.0
}

fn default_economizer_i() -> f64 {
    0.000004
}

fn default_economizer_limit() -> f64 {
    1.1
}

impl EconomizerSettings {
    pub fn new(mode: HvacMode, changeover_delta: f64, target_temperature: f64) -> Self {
        Self {
            mode,
            enabled: true,
            changeover_delta,
            target_temperature,
            keep_hvac_on: false,
            p: default_economizer_p(),
            i: default_economizer_i(),
            saturation_limit: default_economizer_limit(),
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.mode == HvacMode::Fan {
            return Err(ModelError::InvalidArg {
                what: "economizer mode must be cooling or heating",
            });
        }
        if !(self.changeover_delta >= 0.0) {
            return Err(ModelError::InvalidArg {
                what: "changeover delta must be non-negative",
            });
        }
        if !self.target_temperature.is_finite() {
            return Err(ModelError::InvalidArg {
                what: "target temperature must be finite",
            });
        }
        Ok(())
    }

    /// Same user-facing policy; controller tuning is not compared.
    pub fn same(&self, other: &EconomizerSettings) -> bool {
        self.mode == other.mode
            && self.enabled == other.enabled
            && self.changeover_delta == other.changeover_delta
            && self.target_temperature == other.target_temperature
            && self.keep_hvac_on == other.keep_hvac_on
    }
}

/// Fully resolved zone settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSettings {
    pub enabled: bool,
    pub setpoint: f64,
    /// Voting zones can start the unit; non-voting zones only ride along.
    pub voting: bool,
    /// Schedule changes are ignored while on hold.
    pub hold: bool,
    /// Non-voting zones with higher priority are serviced first.
    pub dump_priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economizer: Option<EconomizerSettings>,
}

impl ZoneSettings {
    /// Enabled, voting, not on hold, dump priority zero.
    pub fn new(setpoint: f64) -> Self {
        Self {
            enabled: true,
            setpoint,
            voting: true,
            hold: false,
            dump_priority: 0,
            economizer: None,
        }
    }

    /// Apply a partial update; fields present in `update` win.
    pub fn merge(&self, update: &ZoneSettingsUpdate) -> ZoneSettings {
        ZoneSettings {
            enabled: update.enabled.unwrap_or(self.enabled),
            setpoint: update.setpoint.unwrap_or(self.setpoint),
            voting: update.voting.unwrap_or(self.voting),
            hold: update.hold.unwrap_or(self.hold),
            dump_priority: update.dump_priority.unwrap_or(self.dump_priority),
            economizer: update.economizer.clone().or_else(|| self.economizer.clone()),
        }
    }

    /// Compares what affects control decisions; hold and dump priority are ignored.
    pub fn same(&self, other: &ZoneSettings) -> bool {
        let economizer_same = match (&self.economizer, &other.economizer) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same(b),
            _ => false,
        };
        self.enabled == other.enabled
            && self.setpoint == other.setpoint
            && self.voting == other.voting
            && economizer_same
    }
}

/// Partial zone settings; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneSettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setpoint: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voting: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump_priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economizer: Option<EconomizerSettings>,
}

impl ZoneSettingsUpdate {
    pub fn setpoint(setpoint: f64) -> Self {
        Self {
            setpoint: Some(setpoint),
            ..Self::default()
        }
    }

    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }
}

impl From<ZoneSettings> for ZoneSettingsUpdate {
    fn from(s: ZoneSettings) -> Self {
        Self {
            enabled: Some(s.enabled),
            setpoint: Some(s.setpoint),
            voting: Some(s.voting),
            hold: Some(s.hold),
            dump_priority: Some(s.dump_priority),
            economizer: s.economizer,
        }
    }
}

/// Settings coming from a schedule period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSettings {
    /// Name of the schedule period, for diagnostics.
    pub period: String,
    pub settings: ZoneSettingsUpdate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = ZoneSettings::new(21.0);
        assert!(s.enabled);
        assert!(s.voting);
        assert!(!s.hold);
        assert_eq!(s.dump_priority, 0);
    }

    #[test]
    fn merge_prefers_update() {
        let s = ZoneSettings::new(21.0);
        let merged = s.merge(&ZoneSettingsUpdate {
            setpoint: Some(23.0),
            voting: Some(false),
            ..Default::default()
        });
        assert_eq!(merged.setpoint, 23.0);
        assert!(!merged.voting);
        assert!(merged.enabled);
    }

    #[test]
    fn same_ignores_hold_and_dump_priority() {
        let a = ZoneSettings::new(21.0);
        let b = ZoneSettings {
            hold: true,
            dump_priority: 5,
            ..a.clone()
        };
        assert!(a.same(&b));
        let c = ZoneSettings {
            enabled: false,
            ..a.clone()
        };
        assert!(!a.same(&c));
    }

    #[test]
    fn negative_dump_priority_accepted() {
        let update: ZoneSettingsUpdate = serde_json::from_str(r#"{"dump_priority": -2}"#).unwrap();
        let merged = ZoneSettings::new(21.0).merge(&update);
        assert_eq!(merged.dump_priority, -2);
    }

    #[test]
    fn same_compares_economizer() {
        let a = ZoneSettings {
            economizer: Some(EconomizerSettings::new(HvacMode::Cooling, 2.0, 22.0)),
            ..ZoneSettings::new(21.0)
        };
        let b = ZoneSettings::new(21.0);
        assert!(!a.same(&b));
        assert!(a.same(&a.clone()));
    }

    #[test]
    fn range_contains_bounds() {
        let r = SetpointRange::default();
        assert!(r.contains(10.0));
        assert!(r.contains(40.0));
        assert!(!r.contains(40.5));
        assert!(SetpointRange::new(30.0, 20.0).is_err());
    }

    #[test]
    fn economizer_validation() {
        assert!(EconomizerSettings::new(HvacMode::Cooling, 1.0, 22.0).validate().is_ok());
        assert!(EconomizerSettings::new(HvacMode::Fan, 1.0, 22.0).validate().is_err());
        assert!(EconomizerSettings::new(HvacMode::Heating, -1.0, 22.0).validate().is_err());
    }

    #[test]
    fn economizer_defaults_from_json() {
        let s: EconomizerSettings = serde_json::from_str(
            r#"{"mode":"cooling","changeover_delta":1.0,"target_temperature":22.0}"#,
        )
        .unwrap();
        assert!(s.enabled);
        assert!(!s.keep_hvac_on);
        assert_eq!(s.p, 1.0);
        assert_eq!(s.i, 0.000004);
        assert_eq!(s.saturation_limit, 1.1);
    }
}
