//! Error taxonomy for core file operations.
//!
//! Every failure carries the path it happened on, since batch operations
//! must be able to tell the caller which element aborted the batch.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Errors produced by path resolution, listing and tree operations.
#[derive(Debug, Error)]
pub enum OpError {
    /// The raw client path contains a traversal segment.
    #[error("path escapes the share root: '{path}'")]
    PathTraversal { path: String },

    /// A create/open/read failure attributable to access rights.
    #[error("access denied for '{path}': {source}")]
    AccessDenied {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The destination exists but with the wrong type (file vs directory).
    #[error("destination '{path}' exists with the wrong type")]
    DestinationConflict { path: String },

    /// A required stat failed (including stat of a missing source).
    #[error("failed to stat '{path}': {source}")]
    StatFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    /// A cross-device move copied the tree but could not delete the source.
    /// The data exists in both places; the caller must know that.
    #[error("move aborted after copy, '{from}' exists at both source and destination: {source}")]
    MoveAbortedAfterCopy {
        from: String,
        #[source]
        source: Box<OpError>,
    },

    /// Any other IO failure, with the path it occurred on.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl OpError {
    pub(crate) fn access_denied(path: &Path, source: io::Error) -> Self {
        OpError::AccessDenied {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn stat_failed(path: &Path, source: io::Error) -> Self {
        OpError::StatFailed {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        OpError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn missing_source(path: &Path) -> Self {
        OpError::StatFailed {
            path: path.display().to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file or directory"),
        }
    }
}

/// Result alias for core operations.
pub type OpResult<T> = Result<T, OpError>;
