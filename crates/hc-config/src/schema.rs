//! Configuration file schema.

use hc_controls::PidConfig;
use hc_model::{EconomizerSettings, HvacMode, SetpointRange};
use serde::{Deserialize, Serialize};

/// Newest schema version this crate reads.
pub const LATEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub units: Vec<UnitDef>,
}

/// One HVAC unit and the zones it serves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitDef {
    pub name: String,
    pub mode: HvacMode,
    #[serde(default)]
    pub kind: UnitKindDef,
    pub device: DeviceDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump_capacity: Option<usize>,
    #[serde(default)]
    pub zones: Vec<ZoneDef>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnitKindDef {
    #[default]
    SingleStage,
    Variable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceDef {
    /// Relay driven, one mode.
    Switchable {
        address: String,
        #[serde(default)]
        inverted: bool,
    },
    Variable {
        address: String,
        modes: Vec<HvacMode>,
    },
}

impl DeviceDef {
    pub fn address(&self) -> &str {
        match self {
            DeviceDef::Switchable { address, .. } | DeviceDef::Variable { address, .. } => address,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoneDef {
    pub name: String,
    pub setpoint: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<SetpointRange>,
    /// Thermostat gains. Defaults follow the unit mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<PidConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<SensitivityDef>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub voting: bool,
    #[serde(default)]
    pub hold: bool,
    #[serde(default)]
    pub dump_priority: i32,
    /// Sensor silence, in seconds, after which the zone reports a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_timeout_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economizer: Option<EconomizerDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensitivityDef {
    pub half_life_s: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EconomizerDef {
    #[serde(flatten)]
    pub settings: EconomizerSettings,
    pub device: DeviceDef,
    /// Inputs older than this, in seconds, turn the economizer off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_timeout_s: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn zones(&self) -> impl Iterator<Item = (&UnitDef, &ZoneDef)> {
        self.units
            .iter()
            .flat_map(|unit| unit.zones.iter().map(move |zone| (unit, zone)))
    }
}
