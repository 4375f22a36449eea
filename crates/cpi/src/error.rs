//! Error types for CPI release handling and cloud calls.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for CPI operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of CPI errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The release tarball is missing, unreadable or malformed.
    Release,
    /// The provider rejected or failed a call.
    Cloud,
    /// The provider executable or a support job could not be run.
    Process,
    /// Local filesystem failure.
    Io,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Release => "Invalid CPI release",
            Self::Cloud => "Cloud operation failed",
            Self::Process => "Could not run CPI",
            Self::Io => "Filesystem error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while installing or calling a CPI.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The release tarball does not exist.
    #[error("release tarball not found: {0}")]
    ReleaseNotFound(PathBuf),

    /// The tarball could not be unpacked.
    #[error("extracting {path}: {source}")]
    Extract {
        /// Tarball being extracted.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// `release.MF` is missing or not valid YAML.
    #[error("reading release manifest {path}: {message}")]
    InvalidManifest {
        /// Path to the manifest.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// The release does not satisfy the CPI release contract.
    #[error("validating release: {}", problems.join("; "))]
    InvalidRelease {
        /// Every problem found.
        problems: Vec<String>,
    },

    /// IO error during file operations.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A process could not be started.
    #[error("running {path}: {source}")]
    Spawn {
        /// Executable that failed to start.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The provider failed a call.
    #[error("CPI '{method}' failed: {message}")]
    Cloud {
        /// CPI method that failed.
        method: String,
        /// Error message from the provider.
        message: String,
        /// Whether the provider marked the failure as retryable.
        ok_to_retry: bool,
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

    /// Create a cloud error for `method`.
    pub fn cloud(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Cloud {
            method: method.into(),
            message: message.into(),
            ok_to_retry: false,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ReleaseNotFound(_)
            | Error::Extract { .. }
            | Error::InvalidManifest { .. }
            | Error::InvalidRelease { .. } => ErrorCategory::Release,
            Error::Io { .. } => ErrorCategory::Io,
            Error::Spawn { .. } => ErrorCategory::Process,
            Error::Cloud { .. } => ErrorCategory::Cloud,
        }
    }

    /// Whether retrying the same call might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Cloud { ok_to_retry: true, .. })
    }
}
