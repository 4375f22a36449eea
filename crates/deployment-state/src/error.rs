//! Error types for deployment state operations.

use std::io;
use std::path::PathBuf;

/// Result type alias for deployment state operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading or mutating deployment state.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error while reading or writing the state file.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The state file exists but is not a valid state document.
    #[error("invalid deployment state at {path}: {source}")]
    Parse {
        /// Path of the state file.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The state could not be serialized.
    #[error("failed to serialize deployment state: {0}")]
    Serialize(#[source] serde_json::Error),

    /// `update_current` was given an id that has no record.
    #[error("{kind} record '{id}' not found")]
    RecordNotFound {
        /// Record kind ("disk" or "stemcell").
        kind: &'static str,
        /// Requested record id.
        id: String,
    },

    /// A current pointer references a record that no longer exists.
    #[error("current {kind} '{id}' does not match any {kind} record")]
    DanglingPointer {
        /// Record kind ("disk" or "stemcell").
        kind: &'static str,
        /// Pointer value.
        id: String,
    },
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error indicates a corrupted state document rather than
    /// a failed read or write.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::DanglingPointer { .. })
    }
}
