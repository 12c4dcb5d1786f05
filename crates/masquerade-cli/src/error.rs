use thiserror::Error;

use masquerade_core::Error as CoreError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("logging error: {0}")]
    Logging(String),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("{failed} of {total} entities failed")]
    EntitiesFailed { failed: usize, total: usize },
    #[error("configuration does not match the database:\n  {}", .0.join("\n  "))]
    SchemaMismatch(Vec<String>),
}

pub type CliResult<T> = std::result::Result<T, CliError>;
