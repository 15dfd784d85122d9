//! Error types for object-store operations.

use thiserror::Error;

/// Errors from segment store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The container (bucket) does not exist or is unreachable.
    #[error("container '{0}' unavailable: {1}")]
    ContainerUnavailable(String, String),

    /// The requested key does not exist.
    #[error("object '{0}' not found")]
    NotFound(String),

    /// Transient failure talking to the backing store.
    #[error("object store error: {0}")]
    Backend(#[from] object_store::Error),

    /// Invalid key for the configured layout.
    #[error("invalid artifact key: {0}")]
    InvalidKey(String),

    /// An I/O error from local staging.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns `true` if the error indicates a missing object rather than
    /// a store failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound(_) => true,
            StoreError::Backend(e) => matches!(e, object_store::Error::NotFound { .. }),
            _ => false,
        }
    }
}
