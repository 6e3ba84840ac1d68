//! Content identifiers.
//!
//! A content identifier is the SHA-256 digest of the raw content bytes. It is
//! the primary key for every attestation and a seed for ledger addressing, so
//! it is computed exactly once and never re-derived from anything but bytes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::ProvenanceError;

/// 32-byte content digest. Displays and serializes as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId([u8; 32]);

impl ContentId {
    pub const LEN: usize = 32;

    /// Hash raw content bytes.
    pub fn digest(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a hex identifier, rejecting anything that is not exactly 32 bytes.
    pub fn from_hex(s: &str) -> Result<Self, ProvenanceError> {
        let raw = hex::decode(s.trim())
            .map_err(|e| ProvenanceError::Validation(format!("invalid content hash hex: {e}")))?;
        Self::try_from(raw.as_slice())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<&[u8]> for ContentId {
    type Error = ProvenanceError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            ProvenanceError::Validation(format!(
                "content hash must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }
}

impl FromStr for ContentId {
    type Err = ProvenanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.to_hex())
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_matches_known_vector() {
        let id = ContentId::digest(b"abc");
        assert_eq!(
            id.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_digest_is_deterministic() {
        assert_eq!(ContentId::digest(b"hello"), ContentId::digest(b"hello"));
        assert_ne!(ContentId::digest(b"hello"), ContentId::digest(b"hellp"));
    }

    #[test]
    fn test_hex_roundtrip() {
        let id = ContentId::digest(b"roundtrip");
        let parsed: ContentId = id.to_hex().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_rejects_wrong_length() {
        let err = ContentId::from_hex("abcd").unwrap_err();
        assert!(matches!(err, ProvenanceError::Validation(_)));
    }

    #[test]
    fn test_rejects_bad_hex() {
        let err = ContentId::from_hex(&"zz".repeat(32)).unwrap_err();
        assert!(matches!(err, ProvenanceError::Validation(_)));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let id = ContentId::from_bytes([0xab; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));
        let back: ContentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
