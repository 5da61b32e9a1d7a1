//! Error types for revision history and file persistence

use std::path::PathBuf;

use cdconf_artifact::ContentHash;

/// Errors raised by a [`RevisionStore`](crate::RevisionStore)
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Ancestor hash is not in the history
    #[error("unknown revision: {0}")]
    UnknownRevision(ContentHash),

    /// IO error on the history file
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// History entry could not be decoded
    #[error("corrupt history entry {index}: {message}")]
    Corrupt { index: usize, message: String },

    /// Content hash or parent link does not match
    #[error("history chain broken at entry {index}: {reason}")]
    ChainBroken { index: usize, reason: String },

    /// Revision could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure to replace the live configuration file
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// IO error while writing the temporary file or renaming it
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Path has no usable parent directory
    #[error("invalid target path: {0}")]
    InvalidPath(PathBuf),
}

impl PersistError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
