//! Error types for the zone and unit model.

use hc_controls::ControlError;
use thiserror::Error;

use crate::hvac::HvacMode;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// Invalid argument provided to a model constructor or setter.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("{zone}: setpoint {setpoint} is outside of {min}..{max}")]
    SetpointOutOfRange {
        zone: String,
        setpoint: f64,
        min: f64,
        max: f64,
    },

    /// Two zones share a name; usually a copy-paste error in configuration.
    #[error("Duplicate zone: {name}")]
    DuplicateZone { name: String },

    #[error("{device}: mode {mode} is not supported")]
    UnsupportedMode { device: String, mode: HvacMode },

    #[error("{address}: device is closed")]
    DeviceClosed { address: String },

    #[error("{address}: switch failure: {what}")]
    Switch { address: String, what: String },

    #[error(transparent)]
    Control(#[from] ControlError),
}
