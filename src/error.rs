//! Error types for the check-in dispatcher.

/// Usage hint returned for malformed check-in messages.
pub const USAGE_HINT: &str =
    "Checkin message should be of form: CONFIRMATION_NUMBER FIRST_NAME LAST_NAME";

/// Reply when a matching worker is already running.
pub const DUPLICATE_HINT: &str = "This reservation has already had a check-in scheduled.";

/// Reply when the worker could not confirm the reservation.
pub const FAILED_HINT: &str = "Unable to find reservation. Please double check check-in string.";

/// Reply for any failure the caller should not see the details of.
pub const GENERIC_APOLOGY: &str =
    "Something went wrong. Please try again or contact the administrator";

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Failures of the dispatch flow, matched once at the reply boundary.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{}", USAGE_HINT)]
    InvalidFormat,

    #[error("{}", DUPLICATE_HINT)]
    DuplicateCheckin,

    #[error("{}", FAILED_HINT)]
    FailedCheckin,

    /// The caller is not on the allow-list for the requested scope.
    /// Never rendered to the caller.
    #[error("Unauthorized caller {identity}")]
    Unauthorized { identity: String },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Errors from the external worker runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Worker runtime unavailable: {0}")]
    Unavailable(String),

    #[error("Worker {id} not found")]
    NotFound { id: String },

    #[error("Runtime command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Unexpected runtime output: {0}")]
    InvalidOutput(String),
}

impl From<serde_json::Error> for RuntimeError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidOutput(e.to_string())
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
