use thiserror::Error;

use crate::address::AddressError;
use crate::codec::CodecError;
use crate::error::ProvenanceError;

/// Errors from a ledger client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The account at the target address was created by someone else first.
    #[error("account already exists: {0}")]
    AlreadyExists(String),

    /// The ledger ran the transaction and refused it.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("ledger did not confirm within {seconds}s")]
    Timeout { seconds: u64 },

    #[error("undecodable ledger data: {0}")]
    Decode(#[from] CodecError),

    #[error(transparent)]
    Address(#[from] AddressError),
}

impl LedgerError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, LedgerError::AlreadyExists(_))
    }
}

impl From<LedgerError> for ProvenanceError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AlreadyExists(_) | LedgerError::Rejected(_) => {
                ProvenanceError::LedgerRejection(err.to_string())
            }
            LedgerError::Timeout { seconds } => ProvenanceError::timeout("ledger", seconds),
            LedgerError::Rpc(_) | LedgerError::Decode(_) | LedgerError::Address(_) => {
                ProvenanceError::Internal(err.to_string())
            }
        }
    }
}
