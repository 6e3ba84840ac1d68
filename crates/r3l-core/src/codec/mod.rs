//! Binary codec for ledger payloads.
//!
//! Every program payload starts with an 8-byte discriminator. Fixed-width
//! fields sit at fixed offsets; strings and blobs carry a `u32` little-endian
//! length prefix. Absent keys and hashes are all-zero blocks, never omitted.

mod account;
mod buffer;
mod error;
mod instruction;
mod precompile;

pub use account::AttestationAccount;
pub use error::{CodecError, CodecResult};
pub use instruction::{AttestationInstruction, ProgramInstruction, ProofInstruction, MAX_STRING_LEN};
pub use precompile::{compute_unit_limit, decode_compute_unit_limit, Ed25519Verification};

/// Authenticity string fields, in ledger order.
pub(crate) const STRING_FIELDS: [&str; 8] = [
    "trust_list_match",
    "validation_state",
    "digital_source_type",
    "issuer",
    "common_name",
    "software_agent",
    "signing_time",
    "cert_fingerprint",
];

/// First eight bytes of `sha256("<namespace>:<name>")`.
pub mod discriminator {
    pub const SUBMIT_ATTESTATION: [u8; 8] = [238, 220, 255, 105, 183, 211, 40, 83];
    pub const SUBMIT_PROOF: [u8; 8] = [54, 241, 46, 84, 4, 212, 46, 94];
    pub const ATTESTATION_ACCOUNT: [u8; 8] = [152, 125, 183, 86, 36, 146, 121, 73];
}
