//! Codec error types

use thiserror::Error;

/// Errors raised while encoding or decoding ledger payloads.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Payload does not start with a known 8-byte discriminator
    #[error("unknown discriminator: {0:?}")]
    UnknownDiscriminator([u8; 8]),

    /// Ran out of bytes inside a mandatory field
    #[error("truncated at {field}: need {needed} bytes, {remaining} left")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("field {0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("invalid bool byte {0:#04x}")]
    InvalidBool(u8),

    /// String exceeds what the ledger program accepts
    #[error("{field} is {len} bytes, max {max}")]
    StringTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),

    #[error("invalid signature-verification payload: {0}")]
    InvalidPrecompile(String),
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;
