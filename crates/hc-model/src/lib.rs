//! Zone and unit model for Home Climate Control.
//!
//! Data flows bottom-up:
//!
//! 1. A [`Thermostat`] turns temperature samples into calling decisions.
//! 2. A [`Zone`] wraps a thermostat with user policy (enabled, voting, hold,
//!    dump priority, schedule period) and an optional [`Economizer`].
//! 3. A [`ZoneController`] aggregates zone statuses into unit demand.
//! 4. A unit controller turns demand into [`HvacCommand`]s for an [`HvacDevice`].
//!
//! Everything here is synchronous; `hc-director` runs it on tasks.

pub mod economizer;
pub mod error;
pub mod hvac;
pub mod settings;
pub mod status;
pub mod switch;
pub mod thermostat;
pub mod unit_controller;
pub mod zone;
pub mod zone_controller;

pub use economizer::Economizer;
pub use error::{ModelError, ModelResult};
pub use hvac::{HvacCommand, HvacDevice, HvacDeviceStatus, HvacMode, SwitchableHvacDevice, VariableHvacDevice};
pub use settings::{EconomizerSettings, PeriodSettings, SetpointRange, ZoneSettings, ZoneSettingsUpdate};
pub use status::{CallingStatus, EconomizerStatus, ThermostatStatus, ZoneState, ZoneStatus};
pub use switch::{NullSwitch, Switch};
pub use thermostat::{Sensitivity, Thermostat};
pub use unit_controller::{SingleStageUnitController, VariableUnitController};
pub use zone::Zone;
pub use zone_controller::{UnitControlSignal, ZoneController};
