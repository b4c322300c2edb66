//! Error types for the metrics agent
//!
//! Component seams use typed errors; orchestration code wraps them in
//! `anyhow` with context.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading cgroup and proc pseudo-files
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed line in {path:?}: {line:?}")]
    Malformed { path: PathBuf, line: String },
}

impl ParseError {
    pub(crate) fn malformed(path: &std::path::Path, line: &str) -> Self {
        ParseError::Malformed {
            path: path.to_path_buf(),
            line: line.to_string(),
        }
    }
}

/// Errors raised by the round-robin store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid store file {path:?}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("Store {path:?} was created for fields {found:?}, expected {expected:?}")]
    SchemaMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Illegal update of {path:?} at {timestamp}, last update was {last_update}")]
    StaleUpdate {
        path: PathBuf,
        timestamp: i64,
        last_update: i64,
    },
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn format(path: &std::path::Path, reason: impl Into<String>) -> Self {
        StoreError::Format {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while tracking container lifecycle state on disk
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Filesystem operation on {path:?} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Runtime inspect failed for container {container_id}: {reason}")]
    Inspect {
        container_id: String,
        reason: String,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl LifecycleError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        LifecycleError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
