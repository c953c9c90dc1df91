//! Turning a configuration into model objects.

use std::time::Duration;

use hc_controls::PidConfig;
use hc_model::{
    Economizer, HvacDevice, HvacMode, Sensitivity, Switch, SwitchableHvacDevice, Thermostat, VariableHvacDevice,
    Zone, ZoneSettings,
};

use crate::schema::{Config, DeviceDef, UnitDef, UnitKindDef, ZoneDef};
use crate::validate::{seconds, validate_config};
use crate::ConfigResult;

/// Provides the switch behind a switchable device, by device address.
pub type SwitchFactory<'a> = dyn FnMut(&str) -> Box<dyn Switch> + 'a;

/// A unit ready to be handed to a director.
pub struct UnitPlan {
    pub name: String,
    pub mode: HvacMode,
    pub kind: UnitKindDef,
    pub device: Box<dyn HvacDevice>,
    pub dump_capacity: Option<usize>,
    pub zones: Vec<ZonePlan>,
}

pub struct ZonePlan {
    pub zone: Zone,
    pub sensor_timeout: Option<Duration>,
}

/// Thermostat gains used when a zone doesn't set its own.
pub fn default_pid(mode: HvacMode) -> PidConfig {
    let sign = if mode == HvacMode::Cooling { -1.0 } else { 1.0 };
    PidConfig::new(sign, sign * 0.000004, 0.0, 1.1)
}

/// Validate `config` and build every unit in it.
pub fn build(config: &Config, switches: &mut SwitchFactory<'_>) -> ConfigResult<Vec<UnitPlan>> {
    validate_config(config)?;
    config.units.iter().map(|unit| build_unit(unit, switches)).collect()
}

fn build_unit(unit: &UnitDef, switches: &mut SwitchFactory<'_>) -> ConfigResult<UnitPlan> {
    let device = build_device(&unit.device, unit.mode, switches)?;
    let zones = unit
        .zones
        .iter()
        .map(|zone| build_zone(zone, unit.mode, switches))
        .collect::<ConfigResult<Vec<_>>>()?;

    tracing::debug!(unit = %unit.name, mode = %unit.mode, zones = zones.len(), "unit built");

    Ok(UnitPlan {
        name: unit.name.clone(),
        mode: unit.mode,
        kind: unit.kind,
        device,
        dump_capacity: unit.dump_capacity,
        zones,
    })
}

fn build_device(
    device: &DeviceDef,
    mode: HvacMode,
    switches: &mut SwitchFactory<'_>,
) -> ConfigResult<Box<dyn HvacDevice>> {
    Ok(match device {
        DeviceDef::Switchable { address, inverted } => Box::new(SwitchableHvacDevice::new(
            address.clone(),
            mode,
            switches(address),
            *inverted,
        )),
        DeviceDef::Variable { address, modes } => {
            Box::new(VariableHvacDevice::new(address.clone(), modes.iter().copied())?)
        }
    })
}

fn build_zone(zone: &ZoneDef, mode: HvacMode, switches: &mut SwitchFactory<'_>) -> ConfigResult<ZonePlan> {
    let pid = zone.pid.clone().unwrap_or_else(|| default_pid(mode));
    let mut thermostat = Thermostat::new(&zone.name, zone.range.unwrap_or_default(), zone.setpoint, pid)?;
    if let Some(sensitivity) = &zone.sensitivity {
        thermostat = thermostat.with_sensitivity(Sensitivity {
            half_life: seconds(&zone.name, "sensitivity.half_life_s", sensitivity.half_life_s)?,
            multiplier: sensitivity.multiplier,
        })?;
    }

    let settings = ZoneSettings {
        enabled: zone.enabled,
        setpoint: zone.setpoint,
        voting: zone.voting,
        hold: zone.hold,
        dump_priority: zone.dump_priority,
        economizer: zone.economizer.as_ref().map(|e| e.settings.clone()),
    };
    let mut built = Zone::new(thermostat, settings)?;

    if let Some(def) = &zone.economizer {
        let device = build_device(&def.device, def.settings.mode, switches)?;
        let mut economizer = Economizer::new(&zone.name, def.settings.clone(), device)?;
        if let Some(stale) = def.stale_timeout_s {
            economizer = economizer.with_stale_timeout(seconds(&zone.name, "economizer.stale_timeout_s", stale)?);
        }
        built = built.with_economizer(economizer)?;
    }

    let sensor_timeout = zone
        .sensor_timeout_s
        .map(|s| seconds(&zone.name, "sensor_timeout_s", s))
        .transpose()?;

    Ok(ZonePlan {
        zone: built,
        sensor_timeout,
    })
}
