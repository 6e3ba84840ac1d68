//! Attestation data model.
//!
//! An attestation is mirrored in two places: the ledger account (see
//! [`crate::codec::AttestationAccount`]) and the durable record defined here.
//! Both agree on the [`ContentId`]; the durable record carries more.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::address::Pubkey;
use crate::content::ContentId;
use crate::error::ProvenanceError;

/// Source of trust behind an attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProofKind {
    #[default]
    TrustedVerifier,
    WalletSignature,
    ZkProof,
}

impl ProofKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofKind::TrustedVerifier => "trusted_verifier",
            ProofKind::WalletSignature => "wallet_signature",
            ProofKind::ZkProof => "zk_proof",
        }
    }
}

impl fmt::Display for ProofKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProofKind {
    type Err = ProvenanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trusted_verifier" | "" => Ok(ProofKind::TrustedVerifier),
            "wallet_signature" => Ok(ProofKind::WalletSignature),
            "zk_proof" => Ok(ProofKind::ZkProof),
            other => Err(ProvenanceError::Validation(format!("unknown proof kind: {other}"))),
        }
    }
}

/// How the content reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    #[default]
    File,
    Url,
    Text,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::File => "file",
            ContentKind::Url => "url",
            ContentKind::Text => "text",
        }
    }
}

impl FromStr for ContentKind {
    type Err = ProvenanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(ContentKind::File),
            "url" => Ok(ContentKind::Url),
            "text" => Ok(ContentKind::Text),
            other => Err(ProvenanceError::Validation(format!("unknown content kind: {other}"))),
        }
    }
}

/// Authenticity metadata extracted by the verifier. Empty strings mean unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticitySignals {
    pub has_c2pa: bool,
    pub trust_list_match: String,
    pub validation_state: String,
    pub digital_source_type: String,
    pub issuer: String,
    pub common_name: String,
    pub software_agent: String,
    pub signing_time: String,
    pub cert_fingerprint: String,
}

impl AuthenticitySignals {
    /// The eight string fields in ledger (and column) order.
    pub fn strings(&self) -> [&str; 8] {
        [
            self.trust_list_match.as_str(),
            self.validation_state.as_str(),
            self.digital_source_type.as_str(),
            self.issuer.as_str(),
            self.common_name.as_str(),
            self.software_agent.as_str(),
            self.signing_time.as_str(),
            self.cert_fingerprint.as_str(),
        ]
    }

    pub fn from_strings(has_c2pa: bool, [a, b, c, d, e, f, g, h]: [String; 8]) -> Self {
        Self {
            has_c2pa,
            trust_list_match: a,
            validation_state: b,
            digital_source_type: c,
            issuer: d,
            common_name: e,
            software_agent: f,
            signing_time: g,
            cert_fingerprint: h,
        }
    }
}

/// Identity fields as they appear on the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerIdentity {
    pub email_domain: String,
    pub email_hash: Option<[u8; 32]>,
    pub wallet: Option<Pubkey>,
}

impl LedgerIdentity {
    pub fn with_wallet(wallet: Pubkey) -> Self {
        Self {
            wallet: Some(wallet),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.email_domain.is_empty() && self.email_hash.is_none() && self.wallet.is_none()
    }
}

/// Which verifier and trust anchors produced the verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioning {
    pub verifier_version: String,
    pub trust_bundle_hash: String,
}

/// Fuzzy hash and embedding for one content item. Either half may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityFingerprint {
    pub fuzzy_hash: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

impl SimilarityFingerprint {
    pub fn is_empty(&self) -> bool {
        self.fuzzy_hash.is_none() && self.embedding.is_none()
    }
}

/// What was attested and how it is held.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentReference {
    pub kind: ContentKind,
    pub source_url: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
    pub stored: bool,
    pub private: bool,
}

/// Durable attestation record, keyed by content identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationRecord {
    pub content_id: ContentId,
    pub proof_kind: ProofKind,
    pub signals: AuthenticitySignals,

    pub submitter: Option<String>,
    pub wallet: Option<Pubkey>,
    pub email_domain: Option<String>,
    pub org_id: Option<i64>,
    pub org_domain: Option<String>,

    pub versioning: Versioning,
    pub content: ContentReference,

    pub ledger_address: Option<Pubkey>,
    pub tx_signature: Option<String>,

    pub fingerprint: SimilarityFingerprint,

    /// Seconds since epoch.
    pub created_at: i64,
}

impl AttestationRecord {
    pub fn new(content_id: ContentId) -> Self {
        Self {
            content_id,
            proof_kind: ProofKind::default(),
            signals: AuthenticitySignals::default(),
            submitter: None,
            wallet: None,
            email_domain: None,
            org_id: None,
            org_domain: None,
            versioning: Versioning::default(),
            content: ContentReference::default(),
            ledger_address: None,
            tx_signature: None,
            fingerprint: SimilarityFingerprint::default(),
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_private(&self) -> bool {
        self.content.private
    }
}
