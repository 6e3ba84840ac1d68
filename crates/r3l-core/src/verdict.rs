//! Query verdicts: the JSON document handed to external consumers.
//!
//! A verdict is built either from the durable record or, when the mirror has
//! nothing, straight from the ledger account. `unknown` is reserved for
//! content with no attestation anywhere.

use serde::{Deserialize, Serialize};

use crate::address::Pubkey;
use crate::codec::AttestationAccount;
use crate::content::ContentId;
use crate::record::{AttestationRecord, AuthenticitySignals, ProofKind};

/// Wire format version of [`Verdict`].
pub const VERDICT_VERSION: &str = "1.0";

/// IPTC digital-source-type fragments and their display labels, matched in order.
const SOURCE_TYPE_LABELS: [(&str, &str); 6] = [
    ("digitalCapture", "Digital Capture (Camera/Device)"),
    ("trainedAlgorithmicMedia", "AI-Generated"),
    ("compositeWithTrainedAlgorithmicMedia", "Composite (includes AI)"),
    ("algorithmicMedia", "Algorithmically Generated"),
    ("digitalArt", "Digital Art"),
    ("compositeCapture", "Composite Capture"),
];

/// Human label for a digital-source-type URI. Unrecognised values pass through.
pub fn source_type_label(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let label = SOURCE_TYPE_LABELS
        .iter()
        .find(|(key, _)| raw.contains(key))
        .map_or(raw, |(_, label)| *label);
    Some(label.to_string())
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictKind {
    Trusted,
    Attested,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct C2paSection {
    pub present: bool,
    pub trust_list: Option<String>,
    pub validation_state: Option<String>,
    pub digital_source_type: Option<String>,
    pub source_type_label: Option<String>,
}

impl From<&AuthenticitySignals> for C2paSection {
    fn from(s: &AuthenticitySignals) -> Self {
        Self {
            present: s.has_c2pa,
            trust_list: non_empty(&s.trust_list_match),
            validation_state: non_empty(&s.validation_state),
            digital_source_type: non_empty(&s.digital_source_type),
            source_type_label: source_type_label(&s.digital_source_type),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySection {
    pub email_domain: Option<String>,
    pub wallet_pubkey: Option<String>,
    pub wallet_verified_onchain: bool,
    pub org_domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerSection {
    pub issuer: Option<String>,
    pub common_name: Option<String>,
    pub software_agent: Option<String>,
    pub signing_time: Option<String>,
}

impl From<&AuthenticitySignals> for SignerSection {
    fn from(s: &AuthenticitySignals) -> Self {
        Self {
            issuer: non_empty(&s.issuer),
            common_name: non_empty(&s.common_name),
            software_agent: non_empty(&s.software_agent),
            signing_time: non_empty(&s.signing_time),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofSection {
    #[serde(rename = "type")]
    pub kind: String,
    pub on_chain: bool,
    pub pda: Option<String>,
    pub tx_signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationSection {
    pub timestamp: i64,
    pub submitted_by: Option<String>,
    pub verifier_version: Option<String>,
    pub trust_bundle_hash: Option<String>,
}

/// Structured trust verdict for one content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub version: String,
    pub content_hash: String,
    pub verdict: VerdictKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c2pa: Option<C2paSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentitySection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer: Option<SignerSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<ProofSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation: Option<AttestationSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Verdict {
    /// No attestation at any layer.
    pub fn unknown(content: &ContentId) -> Self {
        Self {
            version: VERDICT_VERSION.to_string(),
            content_hash: content.to_hex(),
            verdict: VerdictKind::Unknown,
            c2pa: None,
            identity: None,
            signer: None,
            proof: None,
            attestation: None,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.verdict == VerdictKind::Unknown
    }
}

/// Trust-list categories that make an attestation `trusted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPolicy {
    trusted_categories: Vec<String>,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self::new(["official", "curated"])
    }
}

impl TrustPolicy {
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            trusted_categories: categories.into_iter().map(Into::into).collect(),
        }
    }

    /// `trusted` only via a trusted trust-list category; anything on record is
    /// at least `attested`, with or without C2PA or identity.
    pub fn classify(&self, signals: &AuthenticitySignals) -> VerdictKind {
        if self
            .trusted_categories
            .iter()
            .any(|c| *c == signals.trust_list_match)
        {
            VerdictKind::Trusted
        } else {
            VerdictKind::Attested
        }
    }

    pub fn from_record(&self, record: &AttestationRecord) -> Verdict {
        let wallet_verified = record.wallet.is_some()
            && record.proof_kind == ProofKind::WalletSignature
            && record.ledger_address.is_some();

        Verdict {
            version: VERDICT_VERSION.to_string(),
            content_hash: record.content_id.to_hex(),
            verdict: self.classify(&record.signals),
            c2pa: Some(C2paSection::from(&record.signals)),
            identity: Some(IdentitySection {
                email_domain: record.email_domain.clone().filter(|d| !d.is_empty()),
                wallet_pubkey: record.wallet.map(|w| w.to_string()),
                wallet_verified_onchain: wallet_verified,
                org_domain: record.org_domain.clone().filter(|d| !d.is_empty()),
            }),
            signer: Some(SignerSection::from(&record.signals)),
            proof: Some(ProofSection {
                kind: record.proof_kind.to_string(),
                on_chain: record.ledger_address.is_some(),
                pda: record.ledger_address.map(|a| a.to_string()),
                tx_signature: record.tx_signature.clone(),
            }),
            attestation: Some(AttestationSection {
                timestamp: record.created_at,
                submitted_by: record.submitter.clone(),
                verifier_version: non_empty(&record.versioning.verifier_version),
                trust_bundle_hash: non_empty(&record.versioning.trust_bundle_hash),
            }),
            error: None,
        }
    }

    pub fn from_account(&self, address: &Pubkey, account: &AttestationAccount) -> Verdict {
        let proof_type = if account.proof_type.is_empty() {
            ProofKind::TrustedVerifier.to_string()
        } else {
            account.proof_type.clone()
        };

        Verdict {
            version: VERDICT_VERSION.to_string(),
            content_hash: account.content_id.to_hex(),
            verdict: self.classify(&account.signals),
            c2pa: Some(C2paSection::from(&account.signals)),
            identity: Some(IdentitySection {
                email_domain: non_empty(&account.identity.email_domain),
                wallet_pubkey: account.identity.wallet.map(|w| w.to_string()),
                wallet_verified_onchain: account.identity.wallet.is_some()
                    && account.wallet_sig.is_some(),
                org_domain: None,
            }),
            signer: Some(SignerSection::from(&account.signals)),
            proof: Some(ProofSection {
                kind: proof_type,
                on_chain: true,
                pda: Some(address.to_string()),
                tx_signature: None,
            }),
            attestation: Some(AttestationSection {
                timestamp: account.timestamp,
                submitted_by: Some(account.submitted_by.to_string()),
                verifier_version: non_empty(&account.versioning.verifier_version),
                trust_bundle_hash: non_empty(&account.versioning.trust_bundle_hash),
            }),
            error: None,
        }
    }
}
