//! Error types for the consistent-store crate.

/// Errors produced by a consistent-store client.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or rejected the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A write was rejected because a newer revision already exists.
    #[error("conflicting write: {0}")]
    Conflict(String),
}
