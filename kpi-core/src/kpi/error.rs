use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KpiError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("failed to open database at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
    #[error("metric store path not configured")]
    MissingStore,
    #[error("metric definition {metric_id} not found")]
    DefinitionNotFound { metric_id: String },
    #[error("invalid metric category: {0}")]
    InvalidCategory(String),
    #[error("store task failed: {0}")]
    Task(String),
}

pub type KpiResult<T> = std::result::Result<T, KpiError>;
