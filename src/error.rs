use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while preparing, running or collating a GRAL simulation
#[derive(Debug, Error)]
pub enum Sumo2GralError {
    /// Filesystem error on a specific path
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid user input (bounding box, EPSG, pollutant, layers, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error (unreadable config file, missing required values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input file exists but its content could not be understood
    #[error("Malformed file {path}: {detail}")]
    Malformed { path: PathBuf, detail: String },

    /// Feature accepted by the CLI but not provided by this tool
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// External engine could not be started or exited unsuccessfully
    #[error("GRAL engine error: {0}")]
    Engine(String),

    /// Result renaming would lose or overwrite data
    #[error("Result collation error: {0}")]
    Collation(String),
}

impl Sumo2GralError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Sumo2GralError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn malformed(path: impl AsRef<Path>, detail: impl Into<String>) -> Self {
        Sumo2GralError::Malformed {
            path: path.as_ref().to_path_buf(),
            detail: detail.into(),
        }
    }
}

/// Type alias for Results using Sumo2GralError
pub type Result<T> = std::result::Result<T, Sumo2GralError>;
