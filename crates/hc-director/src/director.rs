//! Unit director: wires zones, aggregation and a unit controller to a device.
//!
//! ```text
//! sensor ─▶ [timeout guard] ─▶ zone task ─┐
//! sensor ─▶ [timeout guard] ─▶ zone task ─┼─▶ unit task ─▶ ZoneController ─▶ unit controller ─▶ device
//! sensor ─▶ [timeout guard] ─▶ zone task ─┘
//! ```
//!
//! Every zone task publishes to the [`ZoneStatusRegistry`] and to a broadcast
//! channel. The unit task broadcasts the commands it applies. When the unit
//! starts, every zone is asked to [`raise`](hc_model::Zone::raise) so zones
//! that are almost calling get serviced in the same run.

use std::collections::BTreeMap;
use std::time::Duration;

use hc_model::{
    HvacCommand, HvacDevice, HvacMode, ModelResult, PeriodSettings, SingleStageUnitController, UnitControlSignal,
    VariableUnitController, Zone, ZoneController, ZoneSettingsUpdate, ZoneStatus,
};
use hc_signal::stream::channel;
use hc_signal::{GuardHandle, Signal, SignalProcessor, SignalReceiver, SignalSender, TimeoutGuard, CHANNEL_CAPACITY};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{DirectorError, DirectorResult};
use crate::registry::ZoneStatusRegistry;

type ZoneSignal = Signal<ZoneStatus, String>;
type CommandSignal = Signal<HvacCommand, String>;
type UnitProcessor = Box<dyn SignalProcessor<UnitControlSignal, HvacCommand, String> + Send>;

/// Which unit controller drives the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitKind {
    /// On/off.
    #[default]
    SingleStage,
    /// Proportional demand.
    Variable,
}

impl UnitKind {
    fn controller(self) -> UnitProcessor {
        match self {
            UnitKind::SingleStage => Box::new(SingleStageUnitController::new()),
            UnitKind::Variable => Box::new(VariableUnitController::new()),
        }
    }
}

/// A zone together with the streams that feed it.
pub struct ZoneInput {
    zone: Zone,
    sensor: SignalReceiver<f64>,
    ambient: Option<SignalReceiver<f64>>,
    timeout: Option<Duration>,
}

impl ZoneInput {
    pub fn new(zone: Zone, sensor: SignalReceiver<f64>) -> Self {
        Self {
            zone,
            sensor,
            ambient: None,
            timeout: None,
        }
    }

    /// Guard the sensor: silence longer than `timeout` becomes a failure signal.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Outdoor temperature for the zone's economizer.
    pub fn with_ambient(mut self, ambient: SignalReceiver<f64>) -> Self {
        self.ambient = Some(ambient);
        self
    }
}

#[derive(Debug)]
enum ZoneCommand {
    Settings(ZoneSettingsUpdate, oneshot::Sender<ModelResult<()>>),
    Period(Option<PeriodSettings>, oneshot::Sender<ModelResult<()>>),
    Raise,
}

/// Control side of a running zone.
#[derive(Debug, Clone)]
pub struct ZoneHandle {
    name: String,
    control: mpsc::Sender<ZoneCommand>,
}

impl ZoneHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply a settings update. Resolves once the zone has accepted or rejected it.
    pub async fn set_settings(&self, update: ZoneSettingsUpdate) -> DirectorResult<()> {
        let (reply, result) = oneshot::channel();
        self.send(ZoneCommand::Settings(update, reply)).await?;
        result.await.map_err(|_| self.closed())??;
        Ok(())
    }

    /// Start (or clear, with `None`) a schedule period.
    pub async fn set_period(&self, period: Option<PeriodSettings>) -> DirectorResult<()> {
        let (reply, result) = oneshot::channel();
        self.send(ZoneCommand::Period(period, reply)).await?;
        result.await.map_err(|_| self.closed())??;
        Ok(())
    }

    async fn send(&self, command: ZoneCommand) -> DirectorResult<()> {
        self.control.send(command).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> DirectorError {
        DirectorError::Closed {
            what: format!("zone {}", self.name),
        }
    }
}

pub struct UnitDirectorBuilder {
    name: String,
    mode: Option<HvacMode>,
    unit: UnitKind,
    device: Option<Box<dyn HvacDevice>>,
    zones: Vec<ZoneInput>,
    dump_capacity: Option<usize>,
}

impl UnitDirectorBuilder {
    pub fn mode(mut self, mode: HvacMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn unit(mut self, unit: UnitKind) -> Self {
        self.unit = unit;
        self
    }

    pub fn device(mut self, device: Box<dyn HvacDevice>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn zone(mut self, zone: ZoneInput) -> Self {
        self.zones.push(zone);
        self
    }

    pub fn dump_capacity(mut self, capacity: usize) -> Self {
        self.dump_capacity = Some(capacity);
        self
    }

    /// Validate, put the device in mode and spawn the tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> DirectorResult<UnitDirector> {
        let mode = self.mode.ok_or(DirectorError::InvalidArg {
            what: "unit mode is required",
        })?;
        let mut device = self.device.ok_or(DirectorError::InvalidArg {
            what: "unit device is required",
        })?;
        if !device.supports(mode) {
            return Err(DirectorError::UnsupportedMode {
                device: device.address().to_string(),
                mode,
            });
        }
        if self.zones.is_empty() {
            return Err(DirectorError::InvalidArg {
                what: "unit needs at least one zone",
            });
        }

        let mut aggregator = ZoneController::new(
            self.zones
                .iter()
                .map(|input| (input.zone.name().to_string(), input.zone.settings().clone())),
        )?;
        if let Some(capacity) = self.dump_capacity {
            aggregator = aggregator.with_dump_capacity(capacity);
        }

        device.apply(HvacCommand::mode_only(mode))?;
        tracing::info!(unit = %self.name, %mode, device = %device.address(), zones = self.zones.len(), "unit starting");

        let (shutdown, _) = watch::channel(false);
        let (statuses, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (commands, _) = broadcast::channel(CHANNEL_CAPACITY);
        let registry = ZoneStatusRegistry::new();
        let (zone_tx, zone_rx) = channel::<ZoneStatus, String>();

        let mut zones = BTreeMap::new();
        let mut guards = Vec::new();
        let mut tasks = Vec::new();

        for input in self.zones {
            let name = input.zone.name().to_string();
            let sensor = match input.timeout {
                Some(timeout) => {
                    let (guarded, guard) = TimeoutGuard::new(name.clone(), timeout, false)?.spawn(input.sensor);
                    guards.push(guard);
                    guarded
                }
                None => input.sensor,
            };
            let (control_tx, control_rx) = mpsc::channel(CHANNEL_CAPACITY);

            let task = ZoneTask {
                name: name.clone(),
                zone: input.zone,
                sensor,
                ambient: input.ambient,
                control: control_rx,
                shutdown: shutdown.subscribe(),
                registry: registry.clone(),
                statuses: statuses.clone(),
                aggregator: zone_tx.clone(),
            };
            tasks.push(tokio::spawn(task.run()));
            zones.insert(
                name.clone(),
                ZoneHandle {
                    name,
                    control: control_tx,
                },
            );
        }
        // The unit task ends once every zone task has dropped its sender.
        drop(zone_tx);

        let unit = UnitTask {
            name: self.name.clone(),
            aggregator,
            controller: self.unit.controller(),
            device,
            input: zone_rx,
            commands: commands.clone(),
            zones: zones.values().map(|h| h.control.clone()).collect(),
        };
        tasks.push(tokio::spawn(unit.run()));

        Ok(UnitDirector {
            name: self.name,
            mode,
            zones,
            registry,
            statuses,
            commands,
            shutdown,
            guards,
            tasks,
        })
    }
}

/// A running unit and its zones.
///
/// Dropping the director leaves the tasks running until their sensors complete;
/// call [`close`](Self::close) to stop them.
pub struct UnitDirector {
    name: String,
    mode: HvacMode,
    zones: BTreeMap<String, ZoneHandle>,
    registry: ZoneStatusRegistry,
    statuses: broadcast::Sender<ZoneSignal>,
    commands: broadcast::Sender<CommandSignal>,
    shutdown: watch::Sender<bool>,
    guards: Vec<GuardHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl UnitDirector {
    pub fn builder(name: impl Into<String>) -> UnitDirectorBuilder {
        UnitDirectorBuilder {
            name: name.into(),
            mode: None,
            unit: UnitKind::default(),
            device: None,
            zones: Vec::new(),
            dump_capacity: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> HvacMode {
        self.mode
    }

    pub fn zone_names(&self) -> impl Iterator<Item = &str> {
        self.zones.keys().map(String::as_str)
    }

    pub fn zone(&self, name: &str) -> DirectorResult<ZoneHandle> {
        self.zones.get(name).cloned().ok_or_else(|| DirectorError::UnknownZone {
            name: name.to_string(),
        })
    }

    pub fn registry(&self) -> ZoneStatusRegistry {
        self.registry.clone()
    }

    /// Zone statuses from now on, payload is the zone name.
    pub fn zone_statuses(&self) -> broadcast::Receiver<ZoneSignal> {
        self.statuses.subscribe()
    }

    /// Commands the unit controller issues from now on, payload is the unit name.
    ///
    /// Failed commands are broadcast as they are; the device gets "off" for them.
    pub fn commands(&self) -> broadcast::Receiver<CommandSignal> {
        self.commands.subscribe()
    }

    /// Ask every task to stop. Idempotent.
    pub fn close(&self) {
        if *self.shutdown.borrow() {
            return;
        }
        tracing::info!(unit = %self.name, "closing");
        self.shutdown.send_replace(true);
        for guard in &self.guards {
            guard.close();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished) && self.guards.iter().all(GuardHandle::is_finished)
    }

    /// Wait until every task has stopped and the device is closed.
    pub async fn join(&mut self) {
        for guard in &mut self.guards {
            guard.join().await;
        }
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::error!(unit = %self.name, error = %e, "task failed");
            }
        }
    }
}

struct ZoneTask {
    name: String,
    zone: Zone,
    sensor: SignalReceiver<f64>,
    ambient: Option<SignalReceiver<f64>>,
    control: mpsc::Receiver<ZoneCommand>,
    shutdown: watch::Receiver<bool>,
    registry: ZoneStatusRegistry,
    statuses: broadcast::Sender<ZoneSignal>,
    aggregator: SignalSender<ZoneStatus, String>,
}

impl ZoneTask {
    async fn run(mut self) {
        let mut director_alive = true;
        let mut ambient_open = self.ambient.is_some();

        loop {
            tokio::select! {
                biased;
                changed = self.shutdown.changed(), if director_alive => {
                    match changed {
                        Ok(()) if *self.shutdown.borrow() => break,
                        Ok(()) => {}
                        Err(_) => director_alive = false,
                    }
                }
                Some(command) = self.control.recv() => {
                    self.command(command).await;
                }
                next = self.sensor.recv() => {
                    let Some(sample) = next else {
                        tracing::info!(zone = %self.name, "sensor stream completed");
                        break;
                    };
                    let status = self.zone.compute(sample.with_payload_of(Some(self.name.clone())));
                    if !self.publish(status).await {
                        break;
                    }
                }
                next = recv_ambient(&mut self.ambient), if ambient_open => {
                    match next {
                        Some(ambient) => {
                            if let Err(e) = self.zone.record_ambient(ambient) {
                                tracing::error!(zone = %self.name, error = %e, "ambient sample rejected");
                            }
                        }
                        None => {
                            tracing::debug!(zone = %self.name, "ambient stream completed");
                            ambient_open = false;
                        }
                    }
                }
            }
        }

        if let Err(e) = self.zone.close() {
            tracing::error!(zone = %self.name, error = %e, "zone close failed");
        }
    }

    async fn command(&mut self, command: ZoneCommand) {
        let (result, reply) = match command {
            ZoneCommand::Settings(update, reply) => (self.zone.set_settings(&update), Some(reply)),
            ZoneCommand::Period(period, reply) => (self.zone.set_period(period), Some(reply)),
            ZoneCommand::Raise => (Ok(self.zone.raise()), None),
        };
        let (ack, replayed) = match result {
            Ok(replayed) => (Ok(()), replayed),
            Err(e) => {
                tracing::warn!(zone = %self.name, error = %e, "zone command rejected");
                (Err(e), None)
            }
        };
        if let Some(reply) = reply {
            let _ = reply.send(ack);
        }
        if let Some(status) = replayed {
            self.publish(status).await;
        }
    }

    /// Returns false once the unit task is gone.
    async fn publish(&mut self, status: ZoneSignal) -> bool {
        if let Err(e) = self.registry.update(status.clone()) {
            tracing::error!(zone = %self.name, error = %e, "registry update failed");
        }
        // No subscribers is fine.
        let _ = self.statuses.send(status.clone());
        if self.aggregator.send(status).await.is_err() {
            tracing::warn!(zone = %self.name, "unit gone, stopping zone");
            return false;
        }
        true
    }
}

async fn recv_ambient(ambient: &mut Option<SignalReceiver<f64>>) -> Option<Signal<f64>> {
    match ambient {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

struct UnitTask {
    name: String,
    aggregator: ZoneController,
    controller: UnitProcessor,
    device: Box<dyn HvacDevice>,
    input: SignalReceiver<ZoneStatus, String>,
    commands: broadcast::Sender<CommandSignal>,
    zones: Vec<mpsc::Sender<ZoneCommand>>,
}

impl UnitTask {
    async fn run(mut self) {
        let mut running = false;

        while let Some(status) = self.input.recv().await {
            let Some(demand) = self.aggregator.process(status) else {
                continue;
            };

            let calling = demand.value().is_some_and(|u: &UnitControlSignal| u.demand > 0.0);
            if calling && !running {
                self.raise_all();
            }
            running = calling;

            let Some(command) = self.controller.process(demand) else {
                continue;
            };
            let effective = match command.value() {
                Some(c) if !command.is_error() => *c,
                _ => {
                    tracing::warn!(unit = %self.name, error = ?command.error(), "unit command failed, turning off");
                    HvacCommand::OFF
                }
            };
            match self.device.apply(effective) {
                Ok(status) => tracing::debug!(unit = %self.name, ?status, "command applied"),
                Err(e) => tracing::error!(unit = %self.name, error = %e, "device rejected command"),
            }

            let _ = self.commands.send(command.with_payload_of(Some(self.name.clone())));
        }

        tracing::info!(unit = %self.name, "zones completed, closing device");
        if let Err(e) = self.device.close() {
            tracing::error!(unit = %self.name, error = %e, "device close failed");
        }
    }

    /// Never blocks: a zone busy enough to have a full queue doesn't need a nudge.
    fn raise_all(&self) {
        tracing::debug!(unit = %self.name, zones = self.zones.len(), "unit started, raising zones");
        for zone in &self.zones {
            if zone.try_send(ZoneCommand::Raise).is_err() {
                tracing::debug!(unit = %self.name, "zone queue full or closed, raise skipped");
            }
        }
    }
}
