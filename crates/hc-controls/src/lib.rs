//! Process controllers for Home Climate Control.
//!
//! A process controller turns a stream of process variable samples into a stream
//! of control outputs, relative to a setpoint that can be changed at any time.
//!
//! - [`PidController`]: proportional-integral-derivative with anti-windup; the
//!   integral and derivative calculations are pluggable strategies
//! - [`HysteresisController`]: two-state dead-band controller
//! - [`HalfLifeController`]: exponentially fading response to step changes
//!
//! Error convention across the workspace: `error = setpoint - process_variable`,
//! so a positive gain pushes the output up when the process variable is low.

pub mod controller;
pub mod error;
pub mod half_life;
pub mod hysteresis;
pub mod pid;
pub mod strategy;

pub use controller::{ControlOutput, ControlStatus, ProcessController};
pub use error::{ControlError, ControlResult};
pub use half_life::HalfLifeController;
pub use hysteresis::{HysteresisController, HysteresisStatus, DEFAULT_HYSTERESIS};
pub use pid::{PidConfig, PidController, PidStatus};
pub use strategy::{
    DerivativeStrategy, IntegralKind, IntegralStrategy, SimpleDerivative, SimpleIntegral,
    SlidingWindowIntegral,
};
