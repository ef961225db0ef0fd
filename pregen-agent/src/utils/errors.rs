//! Custom error types for the pre-generation agent.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PregenError {
    #[error("No world file specified was found, nothing was archived")]
    ArchiveEmpty,

    #[error("Slot not found: {0}")]
    SlotNotFound(String),

    #[error("Filesystem error on {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid log pattern: {0}")]
    Pattern(String),

    #[error("Server process error: {0}")]
    Process(String),

    #[error("Another session is already pending or running")]
    SessionBusy,

    #[error("There is no session to act on")]
    NoSession,

    #[error("The current session is already running")]
    SessionRunning,

    #[error("Restore temp folder {} already exists, remove it manually first", .0.display())]
    TempFolderExists(PathBuf),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not enough slots: {existing} existing + {requested} requested exceeds {max}")]
    SlotLimit {
        requested: usize,
        existing: usize,
        max: usize,
    },
}

impl PregenError {
    /// Wrap an I/O error with the path it happened on
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PregenError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PregenError>;
