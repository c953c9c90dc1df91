//! Error types for building signal processors.

use thiserror::Error;

/// Result type for processor construction.
pub type FilterResult<T> = Result<T, FilterError>;

/// Errors raised when a processor is configured with arguments it cannot honor.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterError {
    /// Invalid argument provided to a processor constructor.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// The same source was listed twice.
    #[error("Duplicate source: {name}")]
    DuplicateSource { name: String },
}
