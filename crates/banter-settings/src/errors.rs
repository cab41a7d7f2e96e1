//! Settings errors.

use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid JSON, or a value has the wrong shape.
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),
    /// A value is outside what the client can run with.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Settings result.
pub type Result<T> = std::result::Result<T, SettingsError>;
