//! HVAC modes, commands and devices.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::switch::Switch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Cooling,
    Heating,
    Fan,
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HvacMode::Cooling => "cooling",
            HvacMode::Heating => "heating",
            HvacMode::Fan => "fan",
        };
        f.write_str(s)
    }
}

/// Command to an HVAC device. Absent fields mean "keep what you have".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HvacCommand {
    pub mode: Option<HvacMode>,
    pub demand: Option<f64>,
    pub fan_speed: Option<f64>,
}

impl HvacCommand {
    /// Everything off, mode unchanged.
    pub const OFF: HvacCommand = HvacCommand {
        mode: None,
        demand: Some(0.0),
        fan_speed: Some(0.0),
    };

    pub fn new(mode: Option<HvacMode>, demand: Option<f64>, fan_speed: Option<f64>) -> Self {
        Self {
            mode,
            demand,
            fan_speed,
        }
    }

    pub fn mode_only(mode: HvacMode) -> Self {
        Self {
            mode: Some(mode),
            demand: None,
            fan_speed: None,
        }
    }

    pub fn is_mode_only(&self) -> bool {
        self.demand.is_none() && self.fan_speed.is_none()
    }

    /// Fold `next` on top of `self`; fields present in `next` win.
    pub fn reconcile(&self, next: &HvacCommand) -> HvacCommand {
        HvacCommand {
            mode: next.mode.or(self.mode),
            demand: next.demand.or(self.demand),
            fan_speed: next.fan_speed.or(self.fan_speed),
        }
    }

    /// Anything running at all.
    pub fn is_running(&self) -> bool {
        self.demand.unwrap_or(0.0) + self.fan_speed.unwrap_or(0.0) > 0.0
    }
}

/// What a device did with a command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HvacDeviceStatus {
    /// Effective command after reconciliation.
    pub command: HvacCommand,
    pub running: bool,
}

/// Something that heats, cools or moves air.
pub trait HvacDevice: Send {
    fn address(&self) -> &str;

    fn modes(&self) -> &[HvacMode];

    fn supports(&self, mode: HvacMode) -> bool {
        self.modes().contains(&mode)
    }

    /// Effective command so far.
    fn requested(&self) -> HvacCommand;

    fn apply(&mut self, command: HvacCommand) -> ModelResult<HvacDeviceStatus>;

    /// Turn everything off and refuse further commands. Idempotent.
    fn close(&mut self) -> ModelResult<()>;
}

/// Single-mode device behind an on/off switch.
pub struct SwitchableHvacDevice {
    address: String,
    modes: [HvacMode; 1],
    inverted: bool,
    switch: Box<dyn Switch>,
    requested: HvacCommand,
    closed: bool,
}

impl SwitchableHvacDevice {
    /// With `inverted`, the switch is off when the device runs.
    pub fn new(address: impl Into<String>, mode: HvacMode, switch: Box<dyn Switch>, inverted: bool) -> Self {
        Self {
            address: address.into(),
            modes: [mode],
            inverted,
            switch,
            requested: HvacCommand::mode_only(mode),
            closed: false,
        }
    }

    fn mode(&self) -> HvacMode {
        self.modes[0]
    }
}

impl fmt::Debug for SwitchableHvacDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchableHvacDevice")
            .field("address", &self.address)
            .field("mode", &self.mode())
            .field("switch", &self.switch.address())
            .field("inverted", &self.inverted)
            .field("requested", &self.requested)
            .finish()
    }
}

impl HvacDevice for SwitchableHvacDevice {
    fn address(&self) -> &str {
        &self.address
    }

    fn modes(&self) -> &[HvacMode] {
        &self.modes
    }

    fn requested(&self) -> HvacCommand {
        self.requested
    }

    fn apply(&mut self, command: HvacCommand) -> ModelResult<HvacDeviceStatus> {
        if self.closed {
            return Err(ModelError::DeviceClosed {
                address: self.address.clone(),
            });
        }
        if let Some(mode) = command.mode {
            if mode != self.mode() {
                return Err(ModelError::UnsupportedMode {
                    device: self.address.clone(),
                    mode,
                });
            }
        }
        if command.is_mode_only() {
            tracing::debug!(device = %self.address, ?command, "mode only command, nothing to switch");
            return Ok(HvacDeviceStatus {
                command: self.requested,
                running: self.requested.is_running(),
            });
        }
        if self.mode() != HvacMode::Cooling && command.fan_speed.is_some_and(|f| f > 0.0) {
            tracing::warn!(device = %self.address, ?command, "fan speed requested outside of cooling mode");
        }

        let reconciled = self.requested.reconcile(&command);
        let running = reconciled.is_running();
        self.switch.set_state(running != self.inverted)?;
        self.requested = reconciled;
        tracing::debug!(device = %self.address, ?reconciled, running, "applied");

        Ok(HvacDeviceStatus {
            command: reconciled,
            running,
        })
    }

    fn close(&mut self) -> ModelResult<()> {
        if self.closed {
            return Ok(());
        }
        tracing::warn!(device = %self.address, "shutting down");
        self.closed = true;
        self.requested = self.requested.reconcile(&HvacCommand::OFF);
        self.switch.set_state(self.inverted)?;
        Ok(())
    }
}

/// Device with proportional demand and fan speed, possibly multi-mode.
#[derive(Debug, Clone)]
pub struct VariableHvacDevice {
    address: String,
    modes: Vec<HvacMode>,
    requested: HvacCommand,
    closed: bool,
}

impl VariableHvacDevice {
    pub fn new(address: impl Into<String>, modes: impl IntoIterator<Item = HvacMode>) -> ModelResult<Self> {
        let mut modes: Vec<HvacMode> = modes.into_iter().collect();
        modes.sort();
        modes.dedup();
        if modes.is_empty() {
            return Err(ModelError::InvalidArg {
                what: "device must support at least one mode",
            });
        }
        Ok(Self {
            address: address.into(),
            modes,
            requested: HvacCommand::default(),
            closed: false,
        })
    }
}

impl HvacDevice for VariableHvacDevice {
    fn address(&self) -> &str {
        &self.address
    }

    fn modes(&self) -> &[HvacMode] {
        &self.modes
    }

    fn requested(&self) -> HvacCommand {
        self.requested
    }

    fn apply(&mut self, command: HvacCommand) -> ModelResult<HvacDeviceStatus> {
        if self.closed {
            return Err(ModelError::DeviceClosed {
                address: self.address.clone(),
            });
        }
        if let Some(mode) = command.mode {
            if !self.supports(mode) {
                return Err(ModelError::UnsupportedMode {
                    device: self.address.clone(),
                    mode,
                });
            }
        }
        let clamp = |v: Option<f64>| v.map(|v| v.clamp(0.0, 1.0));
        let reconciled = self.requested.reconcile(&HvacCommand {
            mode: command.mode,
            demand: clamp(command.demand),
            fan_speed: clamp(command.fan_speed),
        });
        if reconciled.mode.is_none() && reconciled.is_running() {
            tracing::warn!(device = %self.address, ?reconciled, "running without a mode");
        }
        self.requested = reconciled;
        Ok(HvacDeviceStatus {
            command: reconciled,
            running: reconciled.is_running(),
        })
    }

    fn close(&mut self) -> ModelResult<()> {
        if !self.closed {
            self.requested = self.requested.reconcile(&HvacCommand::OFF);
            self.closed = true;
        }
        Ok(())
    }
}
