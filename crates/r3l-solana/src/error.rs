//! Error types for the RPC ledger client

use r3l_core::ledger::LedgerError;
use thiserror::Error;

/// Result type for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;

/// Errors raised while talking to a JSON-RPC node
#[derive(Debug, Error)]
pub enum RpcError {
    /// Network failure before a response arrived
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The node answered with a JSON-RPC error object
    #[error("rpc error {code}: {message}")]
    Response {
        code: i64,
        message: String,
        logs: Vec<String>,
    },

    /// The transaction landed but failed
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// Response did not have the expected shape
    #[error("unexpected response: {0}")]
    Malformed(String),

    #[error("not confirmed after {0}s")]
    Unconfirmed(u64),

    #[error("keypair error: {0}")]
    Keypair(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Logged by the system program when the target account already exists.
const ALREADY_IN_USE: &str = "already in use";

/// Index of the instruction that failed with custom error 0, from a
/// preflight message such as
/// `Error processing Instruction 2: custom program error: 0x0`.
fn custom_zero_in_message(message: &str) -> Option<usize> {
    let (_, rest) = message.split_once("Error processing Instruction ")?;
    let (index, rest) = rest.split_once(':')?;
    if !rest.trim_start().starts_with("custom program error: 0x0") {
        return None;
    }
    index.trim().parse().ok()
}

/// Same, from a landed transaction's `{"InstructionError":[2,{"Custom":0}]}`.
fn custom_zero_in_status(detail: &str) -> Option<usize> {
    let status: serde_json::Value = serde_json::from_str(detail).ok()?;
    let error = status.get("InstructionError")?;
    if error.get(1)?.get("Custom")?.as_u64()? != 0 {
        return None;
    }
    usize::try_from(error.get(0)?.as_u64()?).ok()
}

impl RpcError {
    /// True when the failure means another transaction created the account
    /// first. Custom error 0 only counts when it comes from the instruction
    /// at `program_index`; other programs reuse that code for their own
    /// failures.
    pub fn is_account_in_use(&self, program_index: Option<usize>) -> bool {
        let custom_zero = match self {
            RpcError::Response { message, logs, .. } => {
                if message.contains(ALREADY_IN_USE) || logs.iter().any(|l| l.contains(ALREADY_IN_USE)) {
                    return true;
                }
                custom_zero_in_message(message)
            }
            RpcError::Transaction(detail) => {
                if detail.contains(ALREADY_IN_USE) {
                    return true;
                }
                custom_zero_in_status(detail)
            }
            _ => None,
        };
        custom_zero.is_some() && custom_zero == program_index
    }

    /// Worth another attempt: the request may never have reached the node.
    pub fn is_transient(&self) -> bool {
        match self {
            RpcError::Transport(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    /// Map onto the ledger taxonomy, given the index of the attestation
    /// program's instruction in the failed transaction.
    pub fn into_ledger_error(self, program_index: Option<usize>) -> LedgerError {
        if self.is_account_in_use(program_index) {
            return LedgerError::AlreadyExists(self.to_string());
        }
        match self {
            RpcError::Response { .. } | RpcError::Transaction(_) => LedgerError::Rejected(self.to_string()),
            RpcError::Unconfirmed(seconds) => LedgerError::Timeout { seconds },
            other => LedgerError::Rpc(other.to_string()),
        }
    }
}

impl From<RpcError> for LedgerError {
    fn from(err: RpcError) -> Self {
        err.into_ledger_error(None)
    }
}
