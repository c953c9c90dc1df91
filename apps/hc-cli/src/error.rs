use hc_config::ConfigError;
use hc_director::DirectorError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Director error: {0}")]
    Director(#[from] DirectorError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown unit: {name}")]
    UnknownUnit { name: String },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Simulation stopped: {what} went away")]
    Stopped { what: String },
}
