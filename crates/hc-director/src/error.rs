use hc_model::{HvacMode, ModelError};
use hc_signal::FilterError;
use thiserror::Error;

pub type DirectorResult<T> = Result<T, DirectorError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DirectorError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("{device}: mode {mode} is not supported")]
    UnsupportedMode { device: String, mode: HvacMode },

    #[error("Unknown zone: {name}")]
    UnknownZone { name: String },

    /// The director, or the zone task behind a handle, has shut down.
    #[error("{what} is closed")]
    Closed { what: String },

    #[error("Lock poisoned: {what}")]
    Poisoned { what: &'static str },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Filter(#[from] FilterError),
}
