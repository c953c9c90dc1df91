//! Aggregation of zone statuses into unit demand.
//!
//! Rules:
//!
//! - Zones in error and disabled zones don't count.
//! - The unit runs if any voting zone calls. Non-voting zones ride along and add
//!   their demand once the unit runs anyway.
//! - If no zone is both enabled and voting, non-voting zones drive the unit on
//!   their own, otherwise the unit could never start.
//! - Non-voting ("dump") zones are serviced by descending dump priority, ties
//!   broken by zone name, up to `dump_capacity` of them.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use hc_signal::{Signal, SignalProcessor};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::settings::ZoneSettings;
use crate::status::ZoneStatus;

/// What the unit is asked to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitControlSignal {
    /// Sum of serviced zone demands; 0 means off.
    pub demand: f64,
    /// `None` leaves the fan to the unit controller.
    pub fan_speed: Option<f64>,
    /// Names of the zones the demand was collected from.
    pub serviced: Vec<String>,
}

impl UnitControlSignal {
    pub fn off() -> Self {
        Self {
            demand: 0.0,
            fan_speed: None,
            serviced: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct ZoneController {
    /// Latest known settings per zone; configured values until the zone reports.
    settings: BTreeMap<String, ZoneSettings>,
    statuses: BTreeMap<String, Signal<ZoneStatus, String>>,
    dump_capacity: Option<usize>,
    last_calling: usize,
}

impl ZoneController {
    pub fn new(zones: impl IntoIterator<Item = (String, ZoneSettings)>) -> ModelResult<Self> {
        let mut settings = BTreeMap::new();
        for (name, zone) in zones {
            if settings.contains_key(&name) {
                tracing::error!(zone = %name, "duplicate zone name, check zone and thermostat configuration");
                return Err(ModelError::DuplicateZone { name });
            }
            settings.insert(name, zone);
        }
        if settings.is_empty() {
            return Err(ModelError::InvalidArg {
                what: "zone controller needs at least one zone",
            });
        }
        tracing::info!(zones = ?settings.keys().collect::<Vec<_>>(), "zones configured");

        Ok(Self {
            settings,
            statuses: BTreeMap::new(),
            dump_capacity: None,
            last_calling: 0,
        })
    }

    /// Service at most `capacity` non-voting zones at a time.
    pub fn with_dump_capacity(mut self, capacity: usize) -> Self {
        self.dump_capacity = Some(capacity);
        self
    }

    pub fn zones(&self) -> impl Iterator<Item = &str> {
        self.settings.keys().map(String::as_str)
    }

    /// Latest signal per zone.
    pub fn statuses(&self) -> &BTreeMap<String, Signal<ZoneStatus, String>> {
        &self.statuses
    }

    fn capture(&mut self, name: &str, signal: Signal<ZoneStatus, String>) {
        if let Some(status) = signal.value().filter(|_| !signal.is_error()) {
            if let Some(known) = self.settings.get_mut(name) {
                *known = status.settings.clone();
            }
        }
        self.statuses.insert(name.to_string(), signal);
    }

    fn voting_enabled(&self) -> usize {
        self.settings.values().filter(|s| s.enabled && s.voting).count()
    }

    fn aggregate(&mut self) -> UnitControlSignal {
        let mut voting: Vec<(&str, f64)> = Vec::new();
        let mut dump: Vec<(&str, i32, f64)> = Vec::new();

        for (name, signal) in &self.statuses {
            let Some(status) = signal.value().filter(|_| !signal.is_error()) else {
                continue;
            };
            if !status.settings.enabled || !status.calling.calling {
                continue;
            }
            if status.settings.voting {
                voting.push((name, status.calling.demand));
            } else {
                dump.push((name, status.settings.dump_priority, status.calling.demand));
            }
        }

        dump.sort_by(|a, b| (Reverse(a.1), a.0).cmp(&(Reverse(b.1), b.0)));
        if let Some(capacity) = self.dump_capacity {
            dump.truncate(capacity);
        }

        let demand_voting: f64 = voting.iter().map(|(_, d)| d).sum();
        let demand_total = demand_voting + dump.iter().map(|(_, _, d)| d).sum::<f64>();

        let include_non_voting = self.voting_enabled() == 0;
        if self.last_calling == 0 && !voting.is_empty() {
            tracing::debug!(calling = voting.len(), "unit starting");
        }
        self.last_calling = voting.len();

        tracing::debug!(
            voting = voting.len(),
            dump = dump.len(),
            demand_voting,
            demand_total,
            include_non_voting,
            "aggregated"
        );

        if demand_voting == 0.0 && !include_non_voting {
            return UnitControlSignal::off();
        }

        let use_total = demand_voting * demand_total >= 0.0 && demand_total.abs() > demand_voting.abs();
        let mut serviced: Vec<String> = voting.iter().map(|(n, _)| n.to_string()).collect();
        if use_total {
            serviced.extend(dump.iter().map(|(n, _, _)| n.to_string()));
        }

        UnitControlSignal {
            demand: if use_total { demand_total } else { demand_voting },
            fan_speed: None,
            serviced,
        }
    }
}

impl SignalProcessor<ZoneStatus, UnitControlSignal, String> for ZoneController {
    fn process(&mut self, signal: Signal<ZoneStatus, String>) -> Option<Signal<UnitControlSignal, String>> {
        let name = match signal.payload() {
            Some(name) if self.settings.contains_key(name) => name.clone(),
            other => {
                tracing::warn!(zone = ?other, "alien zone, signal dropped");
                return None;
            }
        };
        let at = signal.timestamp();
        self.capture(&name, signal);
        Some(Signal::ok(at, self.aggregate()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::CallingStatus;
    use chrono::{TimeZone, Utc};
    use hc_core::Timestamp;
    use hc_signal::SignalError;

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap() + chrono::Duration::seconds(secs)
    }

    fn settings(voting: bool, dump_priority: i32) -> ZoneSettings {
        ZoneSettings {
            voting,
            dump_priority,
            ..ZoneSettings::new(21.0)
        }
    }

    fn status(name: &str, settings: ZoneSettings, demand: f64) -> Signal<ZoneStatus, String> {
        Signal::ok(
            t(0),
            ZoneStatus {
                settings,
                calling: CallingStatus {
                    sample: Some(20.0),
                    demand,
                    calling: demand > 0.0,
                },
                economizer: None,
                period: None,
            },
        )
        .with_payload(name.to_string())
    }

    fn controller(zones: &[(&str, ZoneSettings)]) -> ZoneController {
        ZoneController::new(zones.iter().map(|(n, s)| (n.to_string(), s.clone()))).unwrap()
    }

    fn unit(c: &mut ZoneController, s: Signal<ZoneStatus, String>) -> UnitControlSignal {
        c.process(s).unwrap().into_value().unwrap()
    }

    #[test]
    fn duplicate_zones_rejected() {
        let r = ZoneController::new([
            ("a".to_string(), ZoneSettings::new(20.0)),
            ("a".to_string(), ZoneSettings::new(21.0)),
        ]);
        assert!(matches!(r, Err(ModelError::DuplicateZone { name }) if name == "a"));
    }

    #[test]
    fn alien_zone_dropped() {
        let mut c = controller(&[("a", settings(true, 0))]);
        assert!(c.process(status("b", settings(true, 0), 1.0)).is_none());
        assert!(c.statuses().is_empty());
    }

    #[test]
    fn voting_zone_drives_demand() {
        let mut c = controller(&[("a", settings(true, 0)), ("b", settings(true, 0))]);
        let u = unit(&mut c, status("a", settings(true, 0), 0.75));
        assert_eq!(u.demand, 0.75);
        assert_eq!(u.serviced, vec!["a".to_string()]);

        let u = unit(&mut c, status("b", settings(true, 0), 0.5));
        assert_eq!(u.demand, 1.25);

        let u = unit(&mut c, status("a", settings(true, 0), 0.0));
        assert_eq!(u.demand, 0.5);
    }

    #[test]
    fn non_voting_zone_alone_does_not_start_unit() {
        let mut c = controller(&[("a", settings(true, 0)), ("dump", settings(false, 1))]);
        let u = unit(&mut c, status("dump", settings(false, 1), 1.0));
        assert_eq!(u, UnitControlSignal::off());

        let u = unit(&mut c, status("a", settings(true, 0), 0.5));
        assert_eq!(u.demand, 1.5);
        assert_eq!(u.serviced, vec!["a".to_string(), "dump".to_string()]);
    }

    #[test]
    fn no_voting_zones_lets_non_voting_drive() {
        let mut c = controller(&[("a", settings(false, 0)), ("b", settings(false, 0))]);
        let u = unit(&mut c, status("a", settings(false, 0), 0.5));
        assert_eq!(u.demand, 0.5);
        assert_eq!(u.serviced, vec!["a".to_string()]);
    }

    #[test]
    fn dump_priority_and_capacity() {
        let zones = [
            ("main", settings(true, 0)),
            ("attic", settings(false, 1)),
            ("basement", settings(false, 5)),
            ("garage", settings(false, 5)),
        ];
        let mut c = controller(&zones).with_dump_capacity(2);
        unit(&mut c, status("attic", settings(false, 1), 1.0));
        unit(&mut c, status("garage", settings(false, 5), 1.0));
        unit(&mut c, status("basement", settings(false, 5), 1.0));
        let u = unit(&mut c, status("main", settings(true, 0), 1.0));

        // Priority 5 first, name breaks the tie; attic does not fit.
        assert_eq!(u.serviced, vec!["main", "basement", "garage"]);
        assert_eq!(u.demand, 3.0);
    }

    #[test]
    fn negative_dump_priority_served_last() {
        let zones = [
            ("main", settings(true, 0)),
            ("porch", settings(false, -3)),
            ("attic", settings(false, 0)),
        ];
        let mut c = controller(&zones);
        unit(&mut c, status("porch", settings(false, -3), 1.0));
        unit(&mut c, status("attic", settings(false, 0), 1.0));
        let u = unit(&mut c, status("main", settings(true, 0), 1.0));
        assert_eq!(u.serviced, vec!["main", "attic", "porch"]);

        let mut c = controller(&zones).with_dump_capacity(1);
        unit(&mut c, status("porch", settings(false, -3), 1.0));
        unit(&mut c, status("attic", settings(false, 0), 1.0));
        let u = unit(&mut c, status("main", settings(true, 0), 1.0));
        assert_eq!(u.serviced, vec!["main", "attic"]);
    }

    #[test]
    fn error_and_disabled_zones_ignored() {
        let mut c = controller(&[("a", settings(true, 0)), ("b", settings(true, 0))]);
        unit(&mut c, status("a", settings(true, 0), 1.0));
        let failed = Signal::failure(t(1), SignalError::Timeout {
            marker: "a".into(),
            timeout: std::time::Duration::from_secs(60),
        })
        .with_payload("a".to_string());
        let u = unit(&mut c, failed);
        assert_eq!(u.demand, 0.0);

        let disabled = ZoneSettings {
            enabled: false,
            ..settings(true, 0)
        };
        let u = unit(&mut c, status("b", disabled, 1.0));
        assert_eq!(u.demand, 0.0);
    }

    #[test]
    fn settings_learned_from_statuses() {
        // "a" is configured voting but reports as non-voting; nothing left voting.
        let mut c = controller(&[("a", settings(true, 0))]);
        let u = unit(&mut c, status("a", settings(false, 0), 0.5));
        assert_eq!(u.demand, 0.5);
    }
}
