//! Configuration validation logic.

use std::collections::HashSet;
use std::time::Duration;

use hc_model::HvacMode;
use hc_signal::MIN_TIMEOUT;

use crate::schema::{Config, DeviceDef, EconomizerDef, UnitDef, ZoneDef, LATEST_VERSION};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Duplicate name: {name} in {context}")]
    DuplicateName { name: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported mode: {mode} for {context}")]
    UnsupportedMode { mode: HvacMode, context: String },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

pub fn validate_config(config: &Config) -> Result<(), ValidationError> {
    if config.version == 0 || config.version > LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: config.version,
        });
    }

    let mut unit_names = HashSet::new();
    for unit in &config.units {
        if !unit_names.insert(&unit.name) {
            return Err(ValidationError::DuplicateName {
                name: unit.name.clone(),
                context: "units".to_string(),
            });
        }
        validate_unit(unit)?;
    }

    // Zone statuses are keyed by name, so names are global.
    let mut zone_names = HashSet::new();
    for (unit, zone) in config.zones() {
        if !zone_names.insert(&zone.name) {
            return Err(ValidationError::DuplicateName {
                name: zone.name.clone(),
                context: format!("unit '{}' zones", unit.name),
            });
        }
    }

    Ok(())
}

fn validate_unit(unit: &UnitDef) -> Result<(), ValidationError> {
    if unit.mode == HvacMode::Fan {
        return Err(ValidationError::UnsupportedMode {
            mode: unit.mode,
            context: format!("unit '{}', thermostats need cooling or heating", unit.name),
        });
    }
    if unit.zones.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: format!("unit '{}' zones", unit.name),
            value: "[]".to_string(),
            reason: "a unit needs at least one zone".to_string(),
        });
    }
    validate_device(&unit.device, unit.mode, &format!("unit '{}' device", unit.name))?;

    for zone in &unit.zones {
        validate_zone(zone, unit.mode)?;
    }
    Ok(())
}

fn validate_device(device: &DeviceDef, mode: HvacMode, context: &str) -> Result<(), ValidationError> {
    if device.address().is_empty() {
        return Err(ValidationError::InvalidValue {
            field: format!("{context} address"),
            value: String::new(),
            reason: "must not be empty".to_string(),
        });
    }
    if let DeviceDef::Variable { modes, .. } = device
        && !modes.contains(&mode)
    {
        return Err(ValidationError::UnsupportedMode {
            mode,
            context: format!("{context} '{}'", device.address()),
        });
    }
    Ok(())
}

fn validate_zone(zone: &ZoneDef, mode: HvacMode) -> Result<(), ValidationError> {
    if zone.name.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "zone name".to_string(),
            value: String::new(),
            reason: "must not be empty".to_string(),
        });
    }

    let range = zone.range.unwrap_or_default();
    if !(range.min.is_finite() && range.max.is_finite()) || range.min > range.max {
        return Err(ValidationError::InvalidValue {
            field: format!("zone '{}' range", zone.name),
            value: format!("{}..{}", range.min, range.max),
            reason: "must be finite with min <= max".to_string(),
        });
    }
    if !range.contains(zone.setpoint) {
        return Err(ValidationError::InvalidValue {
            field: format!("zone '{}' setpoint", zone.name),
            value: zone.setpoint.to_string(),
            reason: format!("outside of {}..{}", range.min, range.max),
        });
    }

    if let Some(pid) = &zone.pid {
        pid.validate().map_err(|e| ValidationError::InvalidValue {
            field: format!("zone '{}' pid", zone.name),
            value: format!("p={} i={} d={} limit={}", pid.p, pid.i, pid.d, pid.saturation_limit),
            reason: e.to_string(),
        })?;
        let wrong_sign = match mode {
            HvacMode::Heating => pid.p < 0.0,
            HvacMode::Cooling => pid.p > 0.0,
            HvacMode::Fan => false,
        };
        if wrong_sign {
            return Err(ValidationError::InvalidValue {
                field: format!("zone '{}' pid.p", zone.name),
                value: pid.p.to_string(),
                reason: format!("sign does not match unit mode {mode}"),
            });
        }
    }

    if let Some(sensitivity) = &zone.sensitivity {
        seconds(&zone.name, "sensitivity.half_life_s", sensitivity.half_life_s)?;
        positive(&zone.name, "sensitivity.multiplier", sensitivity.multiplier)?;
    }

    if let Some(timeout) = zone.sensor_timeout_s {
        if seconds(&zone.name, "sensor_timeout_s", timeout)? < MIN_TIMEOUT {
            return Err(ValidationError::InvalidValue {
                field: format!("zone '{}' sensor_timeout_s", zone.name),
                value: timeout.to_string(),
                reason: format!("shorter than {:?}", MIN_TIMEOUT),
            });
        }
    }

    if let Some(economizer) = &zone.economizer {
        validate_economizer(&zone.name, economizer)?;
    }
    Ok(())
}

fn validate_economizer(zone: &str, economizer: &EconomizerDef) -> Result<(), ValidationError> {
    let settings = &economizer.settings;
    settings.validate().map_err(|e| ValidationError::InvalidValue {
        field: format!("zone '{zone}' economizer"),
        value: format!("{settings:?}"),
        reason: e.to_string(),
    })?;
    if !(settings.saturation_limit >= 0.0) {
        return Err(ValidationError::InvalidValue {
            field: format!("zone '{zone}' economizer.saturation_limit"),
            value: settings.saturation_limit.to_string(),
            reason: "must be non-negative".to_string(),
        });
    }
    validate_device(
        &economizer.device,
        settings.mode,
        &format!("zone '{zone}' economizer device"),
    )?;
    if let Some(stale) = economizer.stale_timeout_s {
        seconds(zone, "economizer.stale_timeout_s", stale)?;
    }
    Ok(())
}

fn positive(zone: &str, field: &str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: format!("zone '{zone}' {field}"),
            value: value.to_string(),
            reason: "must be positive and finite".to_string(),
        });
    }
    Ok(())
}

/// A positive number of seconds that fits in a `Duration`.
pub(crate) fn seconds(zone: &str, field: &str, value: f64) -> Result<Duration, ValidationError> {
    positive(zone, field, value)?;
    Duration::try_from_secs_f64(value).map_err(|e| ValidationError::InvalidValue {
        field: format!("zone '{zone}' {field}"),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::UnitKindDef;
    use hc_controls::PidConfig;
    use hc_model::{EconomizerSettings, SetpointRange};

    fn zone(name: &str) -> ZoneDef {
        ZoneDef {
            name: name.to_string(),
            setpoint: 21.0,
            range: None,
            pid: None,
            sensitivity: None,
            enabled: true,
            voting: true,
            hold: false,
            dump_priority: 0,
            sensor_timeout_s: None,
            economizer: None,
        }
    }

    fn unit(name: &str, zones: Vec<ZoneDef>) -> UnitDef {
        UnitDef {
            name: name.to_string(),
            mode: HvacMode::Heating,
            kind: UnitKindDef::SingleStage,
            device: DeviceDef::Switchable {
                address: format!("{name}-relay"),
                inverted: false,
            },
            dump_capacity: None,
            zones,
        }
    }

    fn config(units: Vec<UnitDef>) -> Config {
        Config {
            version: LATEST_VERSION,
            name: "house".to_string(),
            units,
        }
    }

    #[test]
    fn minimal_config_is_valid() {
        validate_config(&config(vec![unit("furnace", vec![zone("living")])])).unwrap();
    }

    #[test]
    fn zone_names_are_global() {
        let c = config(vec![
            unit("furnace", vec![zone("living")]),
            unit("boiler", vec![zone("living")]),
        ]);
        assert!(matches!(
            validate_config(&c),
            Err(ValidationError::DuplicateName { name, .. }) if name == "living"
        ));
    }

    #[test]
    fn setpoint_outside_range() {
        let mut z = zone("living");
        z.range = Some(SetpointRange { min: 15.0, max: 20.0 });
        let r = validate_config(&config(vec![unit("furnace", vec![z])]));
        assert!(matches!(r, Err(ValidationError::InvalidValue { field, .. }) if field.contains("setpoint")));
    }

    #[test]
    fn pid_gains_checked() {
        let mut z = zone("living");
        z.pid = Some(PidConfig::new(0.0, 0.0, 0.0, 1.0));
        assert!(validate_config(&config(vec![unit("furnace", vec![z.clone()])])).is_err());

        z.pid = Some(PidConfig::new(1.0, 0.0, 0.0, -1.0));
        assert!(validate_config(&config(vec![unit("furnace", vec![z.clone()])])).is_err());

        // Cooling gains on a heating unit.
        z.pid = Some(PidConfig::new(-1.0, 0.0, 0.0, 1.0));
        assert!(validate_config(&config(vec![unit("furnace", vec![z])])).is_err());
    }

    #[test]
    fn fan_units_and_missing_device_modes_rejected() {
        let mut u = unit("blower", vec![zone("living")]);
        u.mode = HvacMode::Fan;
        assert!(matches!(
            validate_config(&config(vec![u])),
            Err(ValidationError::UnsupportedMode { mode: HvacMode::Fan, .. })
        ));

        let mut u = unit("ac", vec![zone("living")]);
        u.mode = HvacMode::Cooling;
        u.device = DeviceDef::Variable {
            address: "heat-only".to_string(),
            modes: vec![HvacMode::Heating],
        };
        assert!(matches!(
            validate_config(&config(vec![u])),
            Err(ValidationError::UnsupportedMode { mode: HvacMode::Cooling, .. })
        ));
    }

    #[test]
    fn sensor_timeout_too_short() {
        let mut z = zone("living");
        z.sensor_timeout_s = Some(0.001);
        assert!(validate_config(&config(vec![unit("furnace", vec![z])])).is_err());
    }

    #[test]
    fn durations_must_fit() {
        let mut z = zone("living");
        z.sensor_timeout_s = Some(1.0e300);
        assert!(matches!(
            validate_config(&config(vec![unit("furnace", vec![z])])),
            Err(ValidationError::InvalidValue { field, .. }) if field == "zone 'living' sensor_timeout_s"
        ));

        let mut z = zone("living");
        z.sensitivity = Some(crate::schema::SensitivityDef {
            half_life_s: f64::MAX,
            multiplier: 1.0,
        });
        assert!(validate_config(&config(vec![unit("furnace", vec![z])])).is_err());

        assert_eq!(seconds("living", "sensor_timeout_s", 90.0), Ok(Duration::from_secs(90)));
    }

    #[test]
    fn economizer_checked() {
        let mut z = zone("living");
        z.economizer = Some(EconomizerDef {
            settings: EconomizerSettings::new(HvacMode::Fan, 1.0, 22.0),
            device: DeviceDef::Switchable {
                address: "fan".to_string(),
                inverted: false,
            },
            stale_timeout_s: None,
        });
        assert!(validate_config(&config(vec![unit("furnace", vec![z])])).is_err());
    }

    #[test]
    fn future_version_rejected() {
        let mut c = config(vec![unit("furnace", vec![zone("living")])]);
        c.version = LATEST_VERSION + 1;
        assert!(matches!(
            validate_config(&c),
            Err(ValidationError::UnsupportedVersion { .. })
        ));
    }
}
