//! What thermostats, economizers and zones report.

use hc_signal::{Signal, SignalError};
use serde::{Deserialize, Serialize};

use crate::settings::{EconomizerSettings, PeriodSettings, ZoneSettings};

/// Calling decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CallingStatus {
    /// Temperature the decision was based on.
    pub sample: Option<f64>,
    /// How badly the zone wants service, 0..1.
    pub demand: f64,
    pub calling: bool,
}

impl CallingStatus {
    /// Not calling, no demand.
    pub const IDLE: CallingStatus = CallingStatus {
        sample: None,
        demand: 0.0,
        calling: false,
    };
}

/// Thermostat output.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatStatus {
    pub setpoint: f64,
    /// `setpoint - temperature`.
    pub error: f64,
    pub calling: CallingStatus,
    /// Set when a degraded sensor reading was used as if it were healthy.
    pub masked: Option<SignalError>,
}

/// Economizer state, attached to the status of the zone it serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomizerStatus {
    pub settings: Option<EconomizerSettings>,
    /// Combined indoor/ambient signal last fed to the controller.
    pub sample: Option<f64>,
    /// Controller output.
    pub demand: f64,
    /// `None` until the first decision.
    pub active: Option<bool>,
    pub ambient: Option<f64>,
}

/// Zone output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStatus {
    pub settings: ZoneSettings,
    pub calling: CallingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economizer: Option<EconomizerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<PeriodSettings>,
}

/// Coarse zone condition, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneState {
    Error,
    Off,
    Calling,
    Happy,
}

impl ZoneState {
    pub fn of<P>(signal: &Signal<ZoneStatus, P>) -> Self {
        match signal.value() {
            None => ZoneState::Error,
            Some(_) if signal.is_error() => ZoneState::Error,
            Some(status) if !status.settings.enabled => ZoneState::Off,
            Some(status) if status.calling.calling => ZoneState::Calling,
            Some(_) => ZoneState::Happy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn status(enabled: bool, calling: bool) -> ZoneStatus {
        ZoneStatus {
            settings: ZoneSettings {
                enabled,
                ..ZoneSettings::new(21.0)
            },
            calling: CallingStatus {
                sample: Some(20.0),
                demand: if calling { 1.0 } else { 0.0 },
                calling,
            },
            economizer: None,
            period: None,
        }
    }

    #[test]
    fn classification() {
        let now = Utc::now();
        assert_eq!(ZoneState::of::<()>(&Signal::ok(now, status(true, true))), ZoneState::Calling);
        assert_eq!(ZoneState::of::<()>(&Signal::ok(now, status(true, false))), ZoneState::Happy);
        assert_eq!(ZoneState::of::<()>(&Signal::ok(now, status(false, true))), ZoneState::Off);
        assert_eq!(
            ZoneState::of::<()>(&Signal::failure(now, SignalError::Upstream("x".into()))),
            ZoneState::Error
        );
    }

    #[test]
    fn zone_status_serializes() {
        let json = serde_json::to_value(status(true, true)).unwrap();
        assert_eq!(json["calling"]["calling"], true);
        assert!(json.get("economizer").is_none());
    }
}
