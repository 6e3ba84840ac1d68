//! Ledger account addressing.
//!
//! Attestation accounts live at program-derived addresses: a SHA-256 over the
//! seed list, a bump byte, the owning program id and a fixed marker. The bump
//! is walked down from 255 until the candidate is *not* a valid Ed25519 point,
//! so nobody can hold a private key for the resulting account.

use std::fmt;
use std::str::FromStr;

use curve25519_dalek::edwards::CompressedEdwardsY;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::content::ContentId;

/// Maximum number of seeds, including the bump.
pub const MAX_SEEDS: usize = 16;
/// Maximum length of a single seed.
pub const MAX_SEED_LEN: usize = 32;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Namespace seed for content attestations.
pub const ATTESTATION_SEED: &[u8] = b"attestation";
/// Namespace seed for wallet-bound attestations.
pub const WALLET_SEED: &[u8] = b"wallet";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("too many seeds: {0} > {MAX_SEEDS}")]
    TooManySeeds(usize),

    #[error("seed {index} is {len} bytes, max {MAX_SEED_LEN}")]
    SeedTooLong { index: usize, len: usize },

    #[error("derived address is on the curve")]
    OnCurve,

    #[error("no viable bump seed")]
    NoViableBump,

    #[error("invalid public key: {0}")]
    InvalidKey(String),
}

/// 32-byte ledger public key / account address. Displays as base58.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey([u8; 32]);

impl Pubkey {
    pub const fn new_from_array(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn zeroed() -> Self {
        Self([0u8; 32])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    /// All-zero keys stand for "absent" in fixed-width ledger fields.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Whether the bytes decompress to a valid Ed25519 point.
    pub fn is_on_curve(&self) -> bool {
        CompressedEdwardsY(self.0).decompress().is_some()
    }
}

impl TryFrom<&[u8]> for Pubkey {
    type Error = AddressError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AddressError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }
}

impl FromStr for Pubkey {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = bs58::decode(s)
            .into_vec()
            .map_err(|e| AddressError::InvalidKey(e.to_string()))?;
        Self::try_from(raw.as_slice())
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({self})")
    }
}

impl Serialize for Pubkey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Pubkey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Well-known program and sysvar ids.
pub mod ids {
    use super::Pubkey;

    /// `11111111111111111111111111111111`
    pub const SYSTEM_PROGRAM: Pubkey = Pubkey::zeroed();

    /// `Ed25519SigVerify111111111111111111111111111`
    pub const ED25519_PROGRAM: Pubkey = Pubkey::new_from_array([
        3, 125, 70, 214, 124, 147, 251, 190, 18, 249, 66, 143, 131, 141, 64, 255, 5, 112, 116,
        73, 39, 244, 138, 100, 252, 202, 112, 68, 128, 0, 0, 0,
    ]);

    /// `Sysvar1nstructions1111111111111111111111111`
    pub const INSTRUCTIONS_SYSVAR: Pubkey = Pubkey::new_from_array([
        6, 167, 213, 23, 24, 123, 209, 102, 53, 218, 212, 4, 85, 253, 194, 192, 193, 36, 198,
        143, 33, 86, 117, 165, 219, 186, 203, 95, 8, 0, 0, 0,
    ]);

    /// `ComputeBudget111111111111111111111111111111`
    pub const COMPUTE_BUDGET_PROGRAM: Pubkey = Pubkey::new_from_array([
        3, 6, 70, 111, 229, 33, 23, 50, 255, 236, 173, 186, 114, 195, 155, 231, 188, 140, 229,
        187, 197, 247, 18, 107, 44, 67, 155, 58, 64, 0, 0, 0,
    ]);

    /// `63jq6M3t5NafYWcADqLDCLnhd5qPfEmCUcaA9iWh5YWz`, the deployed attestation program.
    pub const ATTESTATION_PROGRAM: Pubkey = Pubkey::new_from_array([
        74, 254, 5, 250, 115, 6, 108, 157, 182, 216, 207, 248, 150, 216, 62, 41, 166, 195, 22,
        39, 44, 161, 110, 20, 235, 138, 7, 196, 124, 130, 143, 167,
    ]);
}

/// Hash `seeds` under `program_id` and fail if the result is a curve point.
pub fn create_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<Pubkey, AddressError> {
    if seeds.len() > MAX_SEEDS {
        return Err(AddressError::TooManySeeds(seeds.len()));
    }
    for (index, seed) in seeds.iter().enumerate() {
        if seed.len() > MAX_SEED_LEN {
            return Err(AddressError::SeedTooLong {
                index,
                len: seed.len(),
            });
        }
    }

    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);
    let candidate = Pubkey(hasher.finalize().into());

    if candidate.is_on_curve() {
        return Err(AddressError::OnCurve);
    }
    Ok(candidate)
}

/// Find the first off-curve address walking the bump from 255 down to 0.
pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<(Pubkey, u8), AddressError> {
    for bump in (0..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut with_bump: Vec<&[u8]> = seeds.to_vec();
        with_bump.push(&bump_seed);

        match create_program_address(&with_bump, program_id) {
            Ok(address) => return Ok((address, bump)),
            Err(AddressError::OnCurve) => continue,
            Err(other) => return Err(other),
        }
    }
    Err(AddressError::NoViableBump)
}

/// Derive the account for `content` under `namespace`, optionally bound to a key.
pub fn derive(
    namespace: &[u8],
    content: &ContentId,
    extra_key: Option<&Pubkey>,
    program_id: &Pubkey,
) -> Result<(Pubkey, u8), AddressError> {
    match extra_key {
        Some(key) => find_program_address(
            &[namespace, &content.as_bytes()[..], &key.as_bytes()[..]],
            program_id,
        ),
        None => find_program_address(&[namespace, &content.as_bytes()[..]], program_id),
    }
}

/// Address of the attestation account for `content`.
pub fn attestation_address(content: &ContentId, program_id: &Pubkey) -> Result<(Pubkey, u8), AddressError> {
    derive(ATTESTATION_SEED, content, None, program_id)
}
