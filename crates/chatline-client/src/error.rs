//! Error types for the transport layer.

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("HTTP error! status: {status}")]
    Api {
        /// Status code.
        status: u16,
        /// Response body, if any.
        message: String,
    },

    /// The service answered but reported a failure in its body.
    #[error("{0}")]
    Service(String),

    /// No response headers arrived in time.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),
}

/// A result type using `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;
