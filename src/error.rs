//! Error types shared by the counter, the fixer and the log exporter

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FixerError {
    #[error("An error occurred while searching {}: {source}", path.display())]
    Search {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("An error occurred while fixing {}: {source}", path.display())]
    Fix {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("An error occurred while saving the log to {}: {source}", path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} holds {len} bytes, fewer than the {expected}-byte signature", path.display())]
    TooShort {
        path: PathBuf,
        len: u64,
        expected: usize,
    },

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid extension: {0}")]
    InvalidExtension(String),

    #[error("Event capacity {0} exceeds the limit of {max}", max = crate::config::MAX_EVENT_CAPACITY)]
    InvalidEventCapacity(usize),

    #[error("Failed to read config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("A fixing run is already in progress")]
    Busy,

    #[error("Fixing worker panicked")]
    WorkerPanicked,
}

impl FixerError {
    /// True when the underlying I/O failure was a permission denial.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            FixerError::Search { source, .. }
            | FixerError::Fix { source, .. }
            | FixerError::Export { source, .. }
            | FixerError::Config { source, .. } => source.kind() == io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FixerError>;
