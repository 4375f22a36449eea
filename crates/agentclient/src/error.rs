//! Error types for agent communication.

use std::fmt;

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of agent errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The agent could not be reached (transient, retryable).
    Network,
    /// The agent answered with an exception.
    Agent,
    /// The agent answered with something that is not a valid reply.
    Protocol,
    /// A long-running agent task did not finish in time.
    Timeout,
    /// The endpoint itself is malformed.
    Config,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Agent unreachable",
            Self::Agent => "Agent reported an error",
            Self::Protocol => "Invalid agent response",
            Self::Timeout => "Agent task timed out",
            Self::Config => "Invalid agent endpoint",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to an agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The message-bus URL could not be parsed.
    #[error("invalid agent endpoint '{0}'")]
    InvalidEndpoint(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// The agent answered with an exception.
    #[error("agent responded with error to '{method}': {message}")]
    Agent {
        /// Agent method that failed.
        method: String,
        /// Exception message from the agent.
        message: String,
    },

    /// The reply could not be interpreted.
    #[error("invalid response to '{method}': {message}")]
    InvalidResponse {
        /// Agent method that was called.
        method: String,
        /// What was wrong with the reply.
        message: String,
    },

    /// A long-running task was still running after the allowed checks.
    #[error("agent task {task_id} for '{method}' did not finish after {checks} checks")]
    TaskTimeout {
        /// Agent method that started the task.
        method: String,
        /// Agent task id.
        task_id: String,
        /// Number of status checks performed.
        checks: u32,
    },
}

impl Error {
    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Http {
            message: message.into(),
            status,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidEndpoint(_) => ErrorCategory::Config,
            Error::Http { .. } => ErrorCategory::Network,
            Error::Agent { .. } => ErrorCategory::Agent,
            Error::InvalidResponse { .. } => ErrorCategory::Protocol,
            Error::TaskTimeout { .. } => ErrorCategory::Timeout,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                message: format!("HTTP {}", code),
                status: Some(code),
            },
            other => Self::Http {
                message: other.to_string(),
                status: None,
            },
        }
    }
}
