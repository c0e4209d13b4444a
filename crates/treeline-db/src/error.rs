//! Error types for the tree-head database.

/// Errors produced by the local tree-head database.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// An error from the Fjall storage engine.
    #[error("storage engine error: {0}")]
    Engine(#[from] fjall::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    /// Filesystem error while opening or creating the database.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be interpreted.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}
