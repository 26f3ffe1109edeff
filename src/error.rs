//! Crate-level error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors reading or writing a durable record or run state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing file could not be read or written.
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file exists but does not parse.
    #[error("Corrupt store file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The edge name cannot be used as a file name.
    #[error("Invalid edge name {0:?}")]
    InvalidName(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Fatal conditions that stop a decision cycle before any probing.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Another cycle holds the lock for this dnet.
    #[error("Another cycle is already running (lockfile {0})")]
    Locked(PathBuf),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The local reference copy of the test object is unreadable.
    #[error("Cannot read reference object {path}: {source}")]
    Reference {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read edge list for dnet {dnet}: {source}")]
    EdgeList {
        dnet: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read zone templates: {0}")]
    Zones(#[source] std::io::Error),

    /// The run state document could not be read, parsed or written.
    #[error("Run state error: {0}")]
    State(#[source] StoreError),

    /// The lockfile itself could not be opened.
    #[error("Cannot open lockfile {path}: {source}")]
    Lockfile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
