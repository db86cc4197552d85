//! Error types for store access.

/// Errors returned by a `ConfigStore`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached (transport, outage, injected failure).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid entity code '{code}': {reason}")]
    InvalidCode { code: String, reason: String },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
