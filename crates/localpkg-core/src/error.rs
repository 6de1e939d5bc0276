use std::path::PathBuf;
use thiserror::Error;

/// Crate-level error for operations that can actually fail a caller.
///
/// Per-unit failures inside a build pass (a bad manifest, a failing bucket)
/// never surface here; they are logged and recorded in the pass report.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to scan {root}: {source}")]
    Scan {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

impl Error {
    /// Stable error code for JSON output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) | Self::Scan { .. } => crate::codes::IO_ERROR,
            Self::ConfigRead { .. } | Self::ConfigParse { .. } => crate::codes::CONFIG_INVALID,
        }
    }
}
