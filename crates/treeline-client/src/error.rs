//! Error types for the log client.

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors returned by [`LogClient`](crate::LogClient) operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (connect, timeout, body read).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The frontend answered with a non-success status code.
    #[error("unexpected status {status} from {url}")]
    Status {
        /// HTTP status code received.
        status: u16,
        /// Request URL.
        url: String,
    },
}
