//! Stored attestation account layout.
//!
//! The mandatory head (content hash through bump) has been stable since the
//! first program release. Everything after the bump was appended later, so
//! accounts written by older programs simply end early. A tail that runs out
//! of bytes resolves to defaults instead of failing the decode.

use tracing::debug;

use super::buffer::{Reader, Writer};
use super::{discriminator, STRING_FIELDS};
use super::error::{CodecError, CodecResult};
use super::instruction::{read_optional, write_optional};
use crate::address::Pubkey;
use crate::content::ContentId;
use crate::record::{AuthenticitySignals, LedgerIdentity, Versioning};

/// Decoded attestation account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationAccount {
    pub content_id: ContentId,
    pub signals: AuthenticitySignals,
    pub submitted_by: Pubkey,
    /// Ledger clock, seconds since epoch.
    pub timestamp: i64,
    pub bump: u8,

    pub proof_type: String,
    pub identity: LedgerIdentity,
    pub wallet_sig: Option<[u8; 64]>,
    pub versioning: Versioning,
}

impl AttestationAccount {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_discriminator(&discriminator::ATTESTATION_ACCOUNT);
        self.encode_head(&mut w);
        w.string(&self.proof_type).string(&self.identity.email_domain);
        write_optional(&mut w, self.identity.email_hash.as_ref());
        write_optional(&mut w, self.identity.wallet.as_ref().map(Pubkey::as_bytes));
        write_optional(&mut w, self.wallet_sig.as_ref());
        w.string(&self.versioning.verifier_version)
            .string(&self.versioning.trust_bundle_hash);
        w.finish()
    }

    /// Encode only the mandatory head, as the first program release wrote it.
    pub fn encode_legacy(&self) -> Vec<u8> {
        let mut w = Writer::with_discriminator(&discriminator::ATTESTATION_ACCOUNT);
        self.encode_head(&mut w);
        w.finish()
    }

    fn encode_head(&self, w: &mut Writer) {
        w.fixed(self.content_id.as_bytes()).bool(self.signals.has_c2pa);
        for value in self.signals.strings() {
            w.string(value);
        }
        w.fixed(self.submitted_by.as_bytes())
            .i64(self.timestamp)
            .u8(self.bump);
    }

    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        let mut r = Reader::new(data);
        r.discriminator(&discriminator::ATTESTATION_ACCOUNT)?;

        let content_id = ContentId::from_bytes(r.array("content_hash")?);
        // Anchor writes bools as a raw byte; accept any non-zero value here.
        let has_c2pa = r.u8("has_c2pa")? != 0;
        let mut strings: [String; 8] = Default::default();
        for (slot, field) in strings.iter_mut().zip(STRING_FIELDS) {
            *slot = r.string(field)?;
        }
        let submitted_by = Pubkey::new_from_array(r.array("submitted_by")?);
        let timestamp = r.i64("timestamp")?;
        let bump = r.u8("bump")?;

        let mut account = Self {
            content_id,
            signals: AuthenticitySignals::from_strings(has_c2pa, strings),
            submitted_by,
            timestamp,
            bump,
            proof_type: String::new(),
            identity: LedgerIdentity::default(),
            wallet_sig: None,
            versioning: Versioning::default(),
        };

        match account.decode_tail(&mut r) {
            Ok(()) => {}
            Err(CodecError::Truncated { field, .. }) => {
                debug!(content_hash = %account.content_id, field, "account tail ends early, using defaults");
            }
            Err(e) => return Err(e),
        }
        Ok(account)
    }

    fn decode_tail(&mut self, r: &mut Reader<'_>) -> CodecResult<()> {
        if r.is_empty() {
            return Ok(());
        }
        self.proof_type = r.string("proof_type")?;
        self.identity.email_domain = r.string("email_domain")?;
        self.identity.email_hash = read_optional::<32>(r, "email_hash")?;
        self.identity.wallet = read_optional::<32>(r, "wallet")?.map(Pubkey::new_from_array);
        self.wallet_sig = read_optional::<64>(r, "wallet_sig")?;
        self.versioning.verifier_version = r.string("verifier_version")?;
        self.versioning.trust_bundle_hash = r.string("trust_bundle_hash")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn full_account() -> AttestationAccount {
        AttestationAccount {
            content_id: ContentId::digest(b"account"),
            signals: AuthenticitySignals {
                has_c2pa: true,
                trust_list_match: "curated".into(),
                validation_state: "Valid".into(),
                issuer: "Example CA".into(),
                ..Default::default()
            },
            submitted_by: Pubkey::new_from_array([2; 32]),
            timestamp: 1_704_067_200,
            bump: 254,
            proof_type: "wallet_signature".into(),
            identity: LedgerIdentity {
                email_domain: "example.com".into(),
                email_hash: Some([8; 32]),
                wallet: Some(Pubkey::new_from_array([5; 32])),
            },
            wallet_sig: Some([6; 64]),
            versioning: Versioning {
                verifier_version: "0.1.0".into(),
                trust_bundle_hash: "ef".repeat(32),
            },
        }
    }

    #[test]
    fn test_roundtrip_full() {
        let account = full_account();
        assert_eq!(AttestationAccount::decode(&account.encode()).unwrap(), account);
    }

    #[test]
    fn test_roundtrip_all_absent() {
        let account = AttestationAccount {
            proof_type: String::new(),
            identity: LedgerIdentity::default(),
            wallet_sig: None,
            versioning: Versioning::default(),
            ..full_account()
        };
        assert_eq!(AttestationAccount::decode(&account.encode()).unwrap(), account);
    }

    #[test]
    fn test_old_format_decodes_with_empty_tail() {
        let account = full_account();
        let decoded = AttestationAccount::decode(&account.encode_legacy()).unwrap();
        assert_eq!(decoded.content_id, account.content_id);
        assert_eq!(decoded.signals, account.signals);
        assert_eq!(decoded.timestamp, account.timestamp);
        assert_eq!(decoded.bump, 254);
        assert_eq!(decoded.proof_type, "");
        assert!(decoded.identity.is_empty());
        assert!(decoded.wallet_sig.is_none());
        assert_eq!(decoded.versioning, Versioning::default());
    }

    #[test]
    fn test_tail_truncated_mid_field_defaults_rest() {
        let account = full_account();
        let legacy_len = account.encode_legacy().len();
        let mut data = account.encode();
        // keep proof_type and email_domain, cut into email_hash
        let cut = legacy_len + 4 + "wallet_signature".len() + 4 + "example.com".len() + 10;
        data.truncate(cut);

        let decoded = AttestationAccount::decode(&data).unwrap();
        assert_eq!(decoded.proof_type, "wallet_signature");
        assert_eq!(decoded.identity.email_domain, "example.com");
        assert!(decoded.identity.email_hash.is_none());
        assert!(decoded.identity.wallet.is_none());
        assert_eq!(decoded.versioning, Versioning::default());
    }

    #[test]
    fn test_zero_padded_account_decodes() {
        let account = full_account();
        let mut data = account.encode_legacy();
        data.extend_from_slice(&[0u8; 300]);
        let decoded = AttestationAccount::decode(&data).unwrap();
        assert_eq!(decoded.proof_type, "");
        assert!(decoded.identity.wallet.is_none());
    }

    #[test]
    fn test_truncated_head_fails() {
        let data = full_account().encode_legacy();
        let err = AttestationAccount::decode(&data[..data.len() - 1]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { field: "bump", .. }));
    }

    #[test]
    fn test_wrong_discriminator_fails() {
        let mut data = full_account().encode();
        data[..8].copy_from_slice(&discriminator::SUBMIT_ATTESTATION);
        assert!(matches!(
            AttestationAccount::decode(&data),
            Err(CodecError::UnknownDiscriminator(_))
        ));
    }
}
