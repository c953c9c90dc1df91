//! Unit controllers: turn aggregated demand into HVAC commands.
//!
//! Commands carry no mode; the director sets the mode once and devices keep it.
//! Failed input produces a failed command, which the director treats as "off".

use hc_core::clamp_unit;
use hc_signal::{Signal, SignalProcessor};

use crate::hvac::HvacCommand;
use crate::zone_controller::UnitControlSignal;

/// On/off unit. Emits only when the state changes.
#[derive(Debug, Default)]
pub struct SingleStageUnitController {
    running: Option<bool>,
}

impl SingleStageUnitController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running == Some(true)
    }
}

impl<P: Clone> SignalProcessor<UnitControlSignal, HvacCommand, P> for SingleStageUnitController {
    fn process(&mut self, signal: Signal<UnitControlSignal, P>) -> Option<Signal<HvacCommand, P>> {
        let Some(unit) = signal.value().filter(|_| !signal.is_error()) else {
            tracing::warn!(status = %signal.status(), error = ?signal.error(), "unit signal failed");
            self.running = None;
            return Some(signal.derive(None));
        };

        let on = unit.demand > 0.0;
        if self.running == Some(on) {
            return None;
        }
        tracing::info!(from = ?self.running, to = on, demand = unit.demand, "unit state change");
        self.running = Some(on);

        let level = if on { 1.0 } else { 0.0 };
        let fan = unit.fan_speed.map(clamp_unit).unwrap_or(level);
        Some(signal.derive(Some(HvacCommand::new(None, Some(level), Some(fan)))))
    }
}

/// Proportional unit. Demand is clamped to 0..1 and emitted on every signal.
#[derive(Debug, Default)]
pub struct VariableUnitController {
    last: Option<HvacCommand>,
}

impl VariableUnitController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&HvacCommand> {
        self.last.as_ref()
    }
}

impl<P: Clone> SignalProcessor<UnitControlSignal, HvacCommand, P> for VariableUnitController {
    fn process(&mut self, signal: Signal<UnitControlSignal, P>) -> Option<Signal<HvacCommand, P>> {
        let Some(unit) = signal.value().filter(|_| !signal.is_error()) else {
            tracing::warn!(status = %signal.status(), error = ?signal.error(), "unit signal failed");
            return Some(signal.derive(None));
        };

        let demand = clamp_unit(unit.demand);
        let fan = unit.fan_speed.map(clamp_unit).unwrap_or(demand);
        let command = HvacCommand::new(None, Some(demand), Some(fan));
        tracing::debug!(?command, "unit command");
        self.last = Some(command);
        Some(signal.derive(Some(command)))
    }
}
