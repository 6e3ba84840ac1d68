//! Storage error types

use thiserror::Error;

use crate::error::ProvenanceError;

/// Errors that can occur during durable storage operations
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Record not found
    #[error("attestation not found: {0}")]
    NotFound(String),

    /// Stored data could not be turned back into a record
    #[error("invalid attestation data: {0}")]
    InvalidData(String),

    /// Storage backend error (database, filesystem, etc.)
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Query error
    #[error("query error: {0}")]
    Query(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for ProvenanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ProvenanceError::NotFound(id),
            other => ProvenanceError::Internal(other.to_string()),
        }
    }
}
