use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("cannot prepare data directory: {0}")]
    IoError(#[from] io::Error),

    #[error("cannot load .env file: {0}")]
    EnvError(String),
}

/// Errors raised while talking to a Spotify HTTP endpoint.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("gave up on {url} after {attempts} attempts")]
    Exhausted { url: String, attempts: u32 },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while reading or writing local state (outputs, logs, captures).
#[derive(Debug, Error)]
pub enum StateError {
    #[error("io error: {0}")]
    IoError(#[from] io::Error),

    #[error("json error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("parquet error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),

    #[error("arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),

    #[error("{0}")]
    CriticalError(String),
}
