//! Identity proofs: detached Ed25519 signatures over a challenge message.
//!
//! The off-chain check here is a fast fail. The same (key, signature,
//! message) triple is also shipped to the ledger as a signature-verification
//! precompile instruction so the runtime checks it again in the same
//! transaction as the attestation write.

use ed25519_dalek::{Signature, VerifyingKey};
use thiserror::Error;

use crate::address::Pubkey;
use crate::codec::Ed25519Verification;
use crate::content::ContentId;
use crate::error::ProvenanceError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("public key must be 32 bytes, got {0}")]
    KeyLength(usize),

    #[error("signature must be 64 bytes, got {0}")]
    SignatureLength(usize),

    #[error("malformed encoding: {0}")]
    Encoding(String),

    #[error("signature does not verify")]
    Verification,

    #[error("message does not reference content {0}")]
    MessageMismatch(String),
}

impl From<IdentityError> for ProvenanceError {
    fn from(err: IdentityError) -> Self {
        ProvenanceError::InvalidSignature(err.to_string())
    }
}

/// Verify `signature` over `message` under `public_key`.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), IdentityError> {
    let key: [u8; 32] = public_key
        .try_into()
        .map_err(|_| IdentityError::KeyLength(public_key.len()))?;
    let sig: [u8; 64] = signature
        .try_into()
        .map_err(|_| IdentityError::SignatureLength(signature.len()))?;

    let verifying_key =
        VerifyingKey::from_bytes(&key).map_err(|e| IdentityError::Encoding(e.to_string()))?;
    verifying_key
        .verify_strict(message, &Signature::from_bytes(&sig))
        .map_err(|_| IdentityError::Verification)
}

/// Boolean form of [`verify`].
pub fn is_valid(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    verify(public_key, message, signature).is_ok()
}

/// A caller's claim to control `pubkey`, bound to a specific content item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProof {
    pub pubkey: Pubkey,
    pub message: String,
    pub signature: [u8; 64],
}

impl IdentityProof {
    /// Build from the base58 forms wallets hand out.
    pub fn from_base58(pubkey: &str, message: &str, signature: &str) -> Result<Self, IdentityError> {
        let key_bytes = bs58::decode(pubkey)
            .into_vec()
            .map_err(|e| IdentityError::Encoding(e.to_string()))?;
        let sig_bytes = bs58::decode(signature)
            .into_vec()
            .map_err(|e| IdentityError::Encoding(e.to_string()))?;

        let key: [u8; 32] = key_bytes
            .as_slice()
            .try_into()
            .map_err(|_| IdentityError::KeyLength(key_bytes.len()))?;
        let signature: [u8; 64] = sig_bytes
            .as_slice()
            .try_into()
            .map_err(|_| IdentityError::SignatureLength(sig_bytes.len()))?;

        Ok(Self {
            pubkey: Pubkey::new_from_array(key),
            message: message.to_string(),
            signature,
        })
    }

    /// The message must name `content` (hex, either case) so a signature
    /// cannot be replayed against another item.
    pub fn verify_for(&self, content: &ContentId) -> Result<(), IdentityError> {
        let hex = content.to_hex();
        if !self.message.to_ascii_lowercase().contains(&hex) {
            return Err(IdentityError::MessageMismatch(hex));
        }
        verify(self.pubkey.as_bytes(), self.message.as_bytes(), &self.signature)
    }

    /// Payload for the ledger's signature-verification precompile.
    pub fn precompile(&self) -> Ed25519Verification {
        Ed25519Verification {
            pubkey: self.pubkey,
            signature: self.signature,
            message: self.message.as_bytes().to_vec(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use ed25519_dalek::{Signer, SigningKey};

    use super::IdentityProof;
    use crate::address::Pubkey;

    pub fn signing_key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    pub fn sign(key: &SigningKey, message: &str) -> IdentityProof {
        IdentityProof {
            pubkey: Pubkey::new_from_array(key.verifying_key().to_bytes()),
            message: message.to_string(),
            signature: key.sign(message.as_bytes()).to_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{sign, signing_key};
    use super::*;

    #[test]
    fn test_valid_signature_verifies() {
        let id = ContentId::digest(b"a");
        let proof = sign(&signing_key(1), &format!("attest {id}"));
        assert!(proof.verify_for(&id).is_ok());
        assert!(is_valid(proof.pubkey.as_bytes(), proof.message.as_bytes(), &proof.signature));
    }

    #[test]
    fn test_uppercase_hash_in_message_verifies() {
        let id = ContentId::digest(b"a");
        let proof = sign(&signing_key(1), &format!("R3L: attest {}", id.to_hex().to_uppercase()));
        assert!(proof.verify_for(&id).is_ok());
    }

    #[test]
    fn test_replay_against_other_content_fails() {
        let hash_a = ContentId::digest(b"a");
        let hash_b = ContentId::digest(b"b");
        let proof = sign(&signing_key(1), &format!("attest {hash_a}"));
        assert_eq!(
            proof.verify_for(&hash_b).unwrap_err(),
            IdentityError::MessageMismatch(hash_b.to_hex())
        );
    }

    #[test]
    fn test_tampered_message_fails() {
        let id = ContentId::digest(b"a");
        let mut proof = sign(&signing_key(1), &format!("attest {id}"));
        proof.message.push('!');
        assert_eq!(proof.verify_for(&id).unwrap_err(), IdentityError::Verification);
    }

    #[test]
    fn test_wrong_key_fails() {
        let id = ContentId::digest(b"a");
        let mut proof = sign(&signing_key(1), &format!("attest {id}"));
        proof.pubkey = Pubkey::new_from_array(signing_key(2).verifying_key().to_bytes());
        assert_eq!(proof.verify_for(&id).unwrap_err(), IdentityError::Verification);
    }

    #[test]
    fn test_length_checks() {
        assert_eq!(verify(&[0; 31], b"m", &[0; 64]).unwrap_err(), IdentityError::KeyLength(31));
        let key = signing_key(1).verifying_key().to_bytes();
        assert_eq!(
            verify(&key, b"m", &[0; 63]).unwrap_err(),
            IdentityError::SignatureLength(63)
        );
    }

    #[test]
    fn test_from_base58() {
        let id = ContentId::digest(b"a");
        let proof = sign(&signing_key(3), &format!("attest {id}"));
        let parsed = IdentityProof::from_base58(
            &proof.pubkey.to_string(),
            &proof.message,
            &bs58::encode(proof.signature).into_string(),
        )
        .unwrap();
        assert_eq!(parsed, proof);
        assert!(matches!(
            IdentityProof::from_base58("0OIl", "m", "x"),
            Err(IdentityError::Encoding(_))
        ));
    }

    #[test]
    fn test_precompile_carries_triple() {
        let id = ContentId::digest(b"a");
        let proof = sign(&signing_key(1), &format!("attest {id}"));
        let payload = proof.precompile();
        assert_eq!(payload.pubkey, proof.pubkey);
        assert_eq!(payload.message, proof.message.as_bytes());
    }

    #[test]
    fn test_maps_to_invalid_signature() {
        let err: ProvenanceError = IdentityError::Verification.into();
        assert!(matches!(err, ProvenanceError::InvalidSignature(_)));
    }
}
