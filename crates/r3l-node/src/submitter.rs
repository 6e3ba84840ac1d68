//! Attestation submission.
//!
//! One run moves strictly forward: derive the ledger address, check the
//! ledger and then the durable store for an existing attestation, verify the
//! identity proof, send a single transaction, then mirror the attestation
//! into the durable store. The ledger write is the linearization point; a
//! duplicate that slips past the existence check comes back as "account
//! already exists" and is reported as an existing attestation.

use std::sync::Arc;

use r3l_core::address::attestation_address;
use r3l_core::codec::{AttestationInstruction, CodecError, ProgramInstruction, ProofInstruction};
use r3l_core::ledger::instruction::{attestation_program, attestation_transaction};
use r3l_core::ledger::DEFAULT_COMPUTE_UNITS;
use r3l_core::{
    AttestationRecord, AuthenticitySignals, Caller, ContentId, ContentReference, DurableStore,
    IdentityProof, Ledger, LedgerError, LedgerIdentity, ProofKind, ProvenanceError, Pubkey,
    Result, SimilarityFingerprint, Versioning,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

use crate::tracing::prefix;

/// A zero-knowledge proof standing in for the trusted verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZkProof {
    pub proof: Vec<u8>,
    pub public_inputs: Vec<u8>,
}

/// Everything needed to attest one content item.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub content_id: ContentId,
    pub signals: AuthenticitySignals,
    pub caller: Option<Caller>,
    pub identity_proof: Option<IdentityProof>,
    pub zk_proof: Option<ZkProof>,
    /// Keep this attestation off the ledger entirely.
    pub private: bool,
    pub content: ContentReference,
    pub fingerprint: SimilarityFingerprint,
}

impl SubmitRequest {
    pub fn new(content_id: ContentId) -> Self {
        Self {
            content_id,
            signals: AuthenticitySignals::default(),
            caller: None,
            identity_proof: None,
            zk_proof: None,
            private: false,
            content: ContentReference::default(),
            fingerprint: SimilarityFingerprint::default(),
        }
    }

    fn proof_kind(&self) -> ProofKind {
        if self.zk_proof.is_some() {
            ProofKind::ZkProof
        } else if self.identity_proof.is_some() {
            ProofKind::WalletSignature
        } else {
            ProofKind::TrustedVerifier
        }
    }
}

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitOutcome {
    pub content_hash: ContentId,
    /// Already attested; nothing was written.
    pub existing: bool,
    /// Absent for private attestations.
    pub attestation_pda: Option<Pubkey>,
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_pubkey: Option<Pubkey>,
}

impl SubmitOutcome {
    fn existing(content_hash: ContentId, attestation_pda: Option<Pubkey>) -> Self {
        Self {
            content_hash,
            existing: true,
            attestation_pda,
            signature: None,
            email_domain: None,
            wallet_pubkey: None,
        }
    }
}

fn codec_error(err: CodecError) -> ProvenanceError {
    ProvenanceError::Validation(err.to_string())
}

/// SHA-256 of the normalised email address.
pub fn email_hash(email: &str) -> [u8; 32] {
    Sha256::digest(email.trim().to_lowercase().as_bytes()).into()
}

/// Identity as the ledger will see it.
///
/// Privacy-mode callers get a blank identity even when they proved a wallet.
fn ledger_identity(caller: Option<&Caller>, wallet: Option<Pubkey>) -> LedgerIdentity {
    if caller.is_some_and(Caller::privacy_mode) {
        return LedgerIdentity::default();
    }
    let mut identity = LedgerIdentity {
        wallet,
        ..LedgerIdentity::default()
    };
    if let Some(Caller::Individual {
        email: Some(email), ..
    }) = caller
    {
        if let Some((_, domain)) = email.rsplit_once('@') {
            identity.email_domain = domain.to_lowercase();
        }
        identity.email_hash = Some(email_hash(email));
    }
    identity
}

/// Drives attestations onto the ledger and into the durable store.
pub struct AttestationSubmitter {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn DurableStore>,
    versioning: Versioning,
    compute_units: u32,
}

impl AttestationSubmitter {
    pub fn new(ledger: Arc<dyn Ledger>, store: Arc<dyn DurableStore>, versioning: Versioning) -> Self {
        Self {
            ledger,
            store,
            versioning,
            compute_units: DEFAULT_COMPUTE_UNITS,
        }
    }

    pub fn with_compute_units(mut self, units: u32) -> Self {
        self.compute_units = units;
        self
    }

    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitOutcome> {
        let content_id = request.content_id;
        let (address, _) = attestation_address(&content_id, &self.ledger.program_id())
            .map_err(|e| ProvenanceError::from(LedgerError::from(e)))?;

        // The ledger is authoritative: anything already there wins, even for
        // a request that would have stayed private.
        if self.ledger.get_account(&address).await?.is_some() {
            info!("{} {content_id} already attested at {address}", prefix::ATTEST);
            return Ok(SubmitOutcome::existing(content_id, Some(address)));
        }

        // A private record already claims this content; publishing it would
        // leave the store and the ledger disagreeing.
        if let Some(record) = self.lookup(content_id).await? {
            debug!("{} {content_id} already recorded", prefix::DB);
            return Ok(SubmitOutcome::existing(content_id, record.ledger_address));
        }

        if let Some(proof) = &request.identity_proof {
            proof.verify_for(&content_id)?;
            debug!(wallet = %proof.pubkey, "identity proof verified");
        }

        if request.private {
            return self.persist_private(request).await;
        }

        let wallet = request.identity_proof.as_ref().map(|p| p.pubkey);
        let identity = ledger_identity(request.caller.as_ref(), wallet);
        let precompile = match (&request.identity_proof, identity.wallet) {
            (Some(proof), Some(_)) => Some(proof.precompile()),
            _ => None,
        };

        let program_instruction = match &request.zk_proof {
            Some(zk) => ProgramInstruction::Proof(ProofInstruction {
                proof: zk.proof.clone(),
                public_inputs: zk.public_inputs.clone(),
                content_id,
                identity,
                versioning: self.versioning.clone(),
            }),
            None => ProgramInstruction::Attestation(AttestationInstruction {
                content_id,
                signals: request.signals.clone(),
                identity,
                versioning: self.versioning.clone(),
            }),
        };
        let program_call = attestation_program(
            self.ledger.program_id(),
            address,
            self.ledger.payer(),
            &program_instruction,
        )
        .map_err(codec_error)?;
        let instructions = attestation_transaction(self.compute_units, precompile.as_ref(), program_call)
            .map_err(codec_error)?;

        let signature = match self.ledger.submit(instructions).await {
            Ok(signature) => signature,
            Err(e) if e.is_already_exists() => {
                info!("{} {content_id} lost the race to {address}", prefix::ATTEST);
                return Ok(SubmitOutcome::existing(content_id, Some(address)));
            }
            Err(e) => {
                error!("{} ledger submission failed for {content_id}: {e}", prefix::LEDGER);
                return Err(e.into());
            }
        };
        info!("{} {content_id} attested at {address} in {signature}", prefix::ATTEST);

        let record = self.record(&request, Some(address), Some(signature.clone()));
        let outcome = SubmitOutcome {
            content_hash: content_id,
            existing: false,
            attestation_pda: Some(address),
            signature: Some(signature),
            email_domain: record.email_domain.clone(),
            wallet_pubkey: record.wallet,
        };
        if let Err(e) = self.insert(record).await {
            error!("{} {content_id} is on the ledger but not mirrored: {e}", prefix::DB);
            return Err(e);
        }
        Ok(outcome)
    }

    async fn persist_private(&self, request: SubmitRequest) -> Result<SubmitOutcome> {
        let content_id = request.content_id;
        let mut record = self.record(&request, None, None);
        record.content.private = true;
        let email_domain = record.email_domain.clone();
        let wallet = record.wallet;

        if !self.insert(record).await? {
            debug!("{} private {content_id} already recorded", prefix::DB);
            return Ok(SubmitOutcome::existing(content_id, None));
        }
        info!("{} {content_id} recorded privately", prefix::ATTEST);
        Ok(SubmitOutcome {
            content_hash: content_id,
            existing: false,
            attestation_pda: None,
            signature: None,
            email_domain,
            wallet_pubkey: wallet,
        })
    }

    /// The durable record keeps the full identity regardless of privacy mode.
    fn record(
        &self,
        request: &SubmitRequest,
        ledger_address: Option<Pubkey>,
        tx_signature: Option<String>,
    ) -> AttestationRecord {
        let mut record = AttestationRecord::new(request.content_id);
        record.proof_kind = request.proof_kind();
        record.signals = request.signals.clone();
        record.versioning = self.versioning.clone();
        record.content = request.content.clone();
        record.fingerprint = request.fingerprint.clone();
        record.ledger_address = ledger_address;
        record.tx_signature = tx_signature;
        record.wallet = request.identity_proof.as_ref().map(|p| p.pubkey);

        if let Some(caller) = &request.caller {
            record.submitter = Some(caller.submitter_ref());
            record.email_domain = caller.email_domain().map(str::to_lowercase);
            if let Some((org_id, org_domain)) = caller.org() {
                record.org_id = Some(org_id);
                record.org_domain = Some(org_domain.to_string());
            }
        }
        record
    }

    async fn lookup(&self, content_id: ContentId) -> Result<Option<AttestationRecord>> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.get(&content_id))
            .await
            .map_err(|e| ProvenanceError::Internal(format!("store worker: {e}")))?
            .map_err(ProvenanceError::from)
    }

    async fn insert(&self, record: AttestationRecord) -> Result<bool> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.insert_or_ignore(&record))
            .await
            .map_err(|e| ProvenanceError::Internal(format!("store worker: {e}")))?
            .map_err(ProvenanceError::from)
    }
}
