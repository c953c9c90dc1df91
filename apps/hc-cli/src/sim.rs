//! Closed-loop simulation of one unit against a crude room model.
//!
//! Each room drifts towards the outdoor temperature and is pushed back by the
//! unit in proportion to the last commanded demand. Samples are stamped with a
//! synthetic clock, one interval per step, so a long day runs in milliseconds.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use hc_config::{UnitKindDef, UnitPlan};
use hc_director::{UnitDirector, UnitKind, ZoneInput};
use hc_model::{HvacCommand, HvacMode, ZoneState};
use hc_signal::stream::channel;
use hc_signal::{Signal, SignalSender};
use serde::Serialize;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct SimOptions {
    pub steps: usize,
    pub interval: Duration,
    pub start: f64,
    pub outdoor: f64,
    /// Degrees per step at full demand.
    pub gain: f64,
    /// Fraction of the indoor/outdoor difference lost per step.
    pub loss: f64,
    pub json: bool,
}

#[derive(Debug, Default)]
pub struct SimSummary {
    pub commands: usize,
    pub running_steps: usize,
    pub final_states: Vec<(String, ZoneState)>,
}

#[derive(Serialize)]
struct ZoneReport<'a> {
    step: usize,
    at: String,
    zone: &'a str,
    temperature: f64,
    state: ZoneState,
    demand: f64,
}

#[derive(Serialize)]
struct CommandReport<'a> {
    step: usize,
    unit: &'a str,
    command: Option<HvacCommand>,
    error: Option<String>,
}

struct Room {
    name: String,
    temperature: f64,
    sensor: SignalSender<f64>,
    ambient: Option<SignalSender<f64>>,
}

fn unit_kind(kind: UnitKindDef) -> UnitKind {
    match kind {
        UnitKindDef::SingleStage => UnitKind::SingleStage,
        UnitKindDef::Variable => UnitKind::Variable,
    }
}

pub async fn simulate(plan: UnitPlan, options: &SimOptions) -> AppResult<SimSummary> {
    if options.steps == 0 {
        return Err(AppError::InvalidArg {
            what: "steps must be positive",
        });
    }
    let direction = match plan.mode {
        HvacMode::Heating => 1.0,
        HvacMode::Cooling => -1.0,
        HvacMode::Fan => 0.0,
    };

    let mut builder = UnitDirector::builder(plan.name.clone())
        .mode(plan.mode)
        .unit(unit_kind(plan.kind))
        .device(plan.device);
    if let Some(capacity) = plan.dump_capacity {
        builder = builder.dump_capacity(capacity);
    }

    let mut rooms = Vec::new();
    for zone in plan.zones {
        let name = zone.zone.name().to_string();
        let has_economizer = zone.zone.economizer().is_some();
        let (sensor, rx) = channel();
        let mut input = ZoneInput::new(zone.zone, rx);
        if let Some(timeout) = zone.sensor_timeout {
            input = input.with_timeout(timeout);
        }
        let ambient = if has_economizer {
            let (tx, rx) = channel();
            input = input.with_ambient(rx);
            Some(tx)
        } else {
            None
        };
        builder = builder.zone(input);
        rooms.push(Room {
            name,
            temperature: options.start,
            sensor,
            ambient,
        });
    }

    let mut director = builder.start()?;
    let mut statuses = director.zone_statuses();
    let mut commands = director.commands();

    let mut summary = SimSummary::default();
    let mut demand = 0.0;
    let t0 = Utc::now();

    for step in 0..options.steps {
        let at = step_time(t0, options.interval, step)?;

        // Commands lag one step behind the samples that caused them.
        loop {
            match commands.try_recv() {
                Ok(command) => {
                    summary.commands += 1;
                    demand = match command.value() {
                        Some(c) if !command.is_error() => c.demand.unwrap_or(demand),
                        _ => 0.0,
                    };
                    report_command(step, director.name(), &command, options.json)?;
                }
                Err(TryRecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "command reader lagging");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        if demand > 0.0 {
            summary.running_steps += 1;
        }

        for room in &mut rooms {
            room.temperature += (options.outdoor - room.temperature) * options.loss + direction * options.gain * demand;
            if let Some(ambient) = &room.ambient {
                ambient.send(Signal::ok(at, options.outdoor)).await.map_err(|_| stopped(&room.name))?;
            }
            room.sensor
                .send(Signal::ok(at, room.temperature))
                .await
                .map_err(|_| stopped(&room.name))?;
        }

        let mut pending: BTreeSet<&str> = rooms.iter().map(|r| r.name.as_str()).collect();
        while !pending.is_empty() {
            let status = match statuses.recv().await {
                Ok(status) => status,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "status reader lagging");
                    continue;
                }
                Err(RecvError::Closed) => return Err(stopped("zone statuses")),
            };
            if status.timestamp() != at {
                continue;
            }
            let Some(name) = status.payload() else { continue };
            let Some(room) = rooms.iter().find(|r| &r.name == name) else { continue };
            if !pending.remove(room.name.as_str()) {
                continue;
            }
            let report = ZoneReport {
                step,
                at: at.to_rfc3339(),
                zone: &room.name,
                temperature: room.temperature,
                state: ZoneState::of(&status),
                demand: status.value().map_or(0.0, |s| s.calling.demand),
            };
            if options.json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!(
                    "{:>5} {:<12} {:>6.2} {:<8} demand={:.2}",
                    report.step,
                    report.zone,
                    report.temperature,
                    format!("{:?}", report.state),
                    report.demand
                );
            }
        }
    }

    // Completing the sensors winds the unit down and closes the device.
    drop(rooms);
    director.join().await;

    summary.final_states = director.registry().states()?.into_iter().collect();
    Ok(summary)
}

/// `t0 + interval * step`, or an error once that leaves chrono's range.
fn step_time(t0: DateTime<Utc>, interval: Duration, step: usize) -> AppResult<DateTime<Utc>> {
    i32::try_from(step)
        .ok()
        .and_then(|n| interval.checked_mul(n))
        .and_then(|offset| t0.checked_add_signed(offset))
        .ok_or(AppError::InvalidArg {
            what: "simulated time out of range",
        })
}

fn report_command(
    step: usize,
    unit: &str,
    command: &Signal<HvacCommand, String>,
    json: bool,
) -> AppResult<()> {
    let report = CommandReport {
        step,
        unit,
        command: command.value().copied(),
        error: command.error().map(ToString::to_string),
    };
    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        match (&report.command, &report.error) {
            (_, Some(error)) => println!("{:>5} {unit} command failed: {error}", step),
            (Some(c), None) => println!(
                "{:>5} {unit} demand={:.2} fan={:.2}",
                step,
                c.demand.unwrap_or_default(),
                c.fan_speed.unwrap_or_default()
            ),
            (None, None) => {}
        }
    }
    Ok(())
}

fn stopped(what: &str) -> AppError {
    AppError::Stopped {
        what: what.to_string(),
    }
}
