//! Error types for controller configuration.

use thiserror::Error;

/// Result type for controller operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur when configuring a controller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Invalid argument provided to a controller.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// Setpoint the controller cannot work with.
    #[error("Invalid setpoint for {controller}: {value}")]
    InvalidSetpoint { controller: String, value: f64 },
}
