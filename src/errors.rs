use std::path::PathBuf;
use thiserror::Error;

/// Hard failures of a restore run.
///
/// Recoverable conditions (a failing SQL statement, a skipped mapping, a
/// permission that could not be applied, a failed health check) are counted
/// in the run's report instead of being raised through this type.
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("No SQL dump file found in {}", .0.display())]
    MissingDump(PathBuf),

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("ZIP archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Directory walk error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Restore exceeded the maximum execution time of {0} seconds")]
    Timeout(u64),

    #[error("Restore operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, RestoreError>;
