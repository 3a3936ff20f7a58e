//! Error types for the statistics engine

use thiserror::Error;

/// Main error type for the statistics engine
#[derive(Error, Debug)]
pub enum Error {
    /// A caller-supplied argument was rejected before any backend interaction
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The search backend reported an invalid or failed response
    ///
    /// Carries the backend's own error text. Fatal to the calling request;
    /// the engine never retries.
    #[error("Backend query failed: {message}")]
    BackendQueryFailure {
        /// Error detail reported by the backend or its transport
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Create a backend failure error
    pub fn backend(message: impl Into<String>) -> Self {
        Error::BackendQueryFailure {
            message: message.into(),
        }
    }

    /// Whether this error was raised before contacting the backend
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }

    /// Whether this error came from the backend round trip
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Error::BackendQueryFailure { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
