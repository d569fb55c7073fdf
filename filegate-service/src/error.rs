use thiserror::Error;

/// Errors that can occur in the storage service and its backends.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing input. This is the caller's fault and must not be retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The referenced object or local file does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The path violates the naming rules of the storage backend.
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Which rule was violated.
        reason: &'static str,
    },

    /// A transient failure talking to the storage provider, or no usable backend.
    ///
    /// These are safe to retry with backoff at a layer above the service.
    #[error("backend unavailable: {context}")]
    BackendUnavailable {
        /// What the backend was doing when the failure occurred.
        context: String,
        /// The underlying cause, if any.
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a [`Error::BackendUnavailable`] from a context message and an underlying cause.
    pub fn unavailable<E>(context: impl Into<String>, cause: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::BackendUnavailable {
            context: context.into(),
            cause: Some(cause.into()),
        }
    }

    /// Returns `true` if the error is the caller's fault rather than the backend's.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::InvalidPath { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::unavailable("request to storage provider failed", err)
    }
}

/// Result type for service and backend operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
