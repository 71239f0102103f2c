// crates/criteo-core/src/error.rs

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreprocError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file could not be parsed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Input path {} does not exist", .0.display())]
    MissingInput(PathBuf),

    #[error("Criteo parquet path {} does not exist", .0.display())]
    MissingCriteoInput(PathBuf),

    #[error("{} schema mismatch: {reason}", path.display())]
    SchemaMismatch { path: PathBuf, reason: String },

    #[error("column '{column}' is not known to operator {operator}")]
    UnknownColumn {
        operator: &'static str,
        column: String,
    },

    #[error("operator {0} must be fit before transform")]
    NotFitted(&'static str),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Worker {worker} failed: {message}")]
    Worker { worker: usize, message: String },

    #[error("{stage} task failed: {message}")]
    Task { stage: &'static str, message: String },
}

pub type Result<T> = std::result::Result<T, PreprocError>;
