//! Caller-visible error taxonomy.
//!
//! Every collaborator error (store, ledger, codec, subprocess) is mapped into
//! one of these kinds at the component boundary. Transport-level errors never
//! cross into a response as-is.

use thiserror::Error;

/// Errors surfaced to callers of the attestation and similarity services.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProvenanceError {
    /// Malformed input: wrong hash length, bad encoding, oversized upload
    #[error("validation error: {0}")]
    Validation(String),

    /// Identity proof failed verification
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// No attestation at any layer
    #[error("not found: {0}")]
    NotFound(String),

    /// Verifier, embedder or ledger RPC exceeded its bound
    #[error("{service} timed out after {seconds}s")]
    ExternalTimeout { service: String, seconds: u64 },

    /// Ledger refused the transaction
    #[error("ledger rejected transaction: {0}")]
    LedgerRejection(String),

    /// Anything else that went wrong on our side
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProvenanceError {
    /// Client errors are never worth retrying.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ProvenanceError::Validation(_)
                | ProvenanceError::InvalidSignature(_)
                | ProvenanceError::NotFound(_)
        )
    }

    /// Timeouts may be retried by the caller; idempotency makes that safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProvenanceError::ExternalTimeout { .. })
    }

    pub fn timeout(service: impl Into<String>, seconds: u64) -> Self {
        ProvenanceError::ExternalTimeout {
            service: service.into(),
            seconds,
        }
    }
}

/// Result type alias using [`ProvenanceError`].
pub type Result<T> = std::result::Result<T, ProvenanceError>;
