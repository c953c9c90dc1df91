use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Duration out of range: {what}")]
    DurationOutOfRange { what: &'static str },
}
