use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for the capture core. Nothing here is allowed to be
/// fatal to the host: callers log and degrade the affected feature.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// A persisted string-table line could not be parsed. The loader skips
    /// the line and keeps going.
    #[error("malformed string table entry on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Identity resolution or listener attachment failed. Only the feature
    /// that needed it is degraded, not the session.
    #[error("registration failed: {0}")]
    Registration(String),

    /// A log or table file could not be written.
    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, LoggerError>;
