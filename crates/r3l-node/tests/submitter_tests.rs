//! Submission flow against the in-memory ledger and store.

use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use pretty_assertions::assert_eq;
use r3l_core::address::{attestation_address, ids};
use r3l_core::ledger::{lookup_attestation, Instruction, LedgerResult};
use r3l_core::{
    AuthenticitySignals, Caller, ContentId, DurableStore, IdentityProof, Ledger, LedgerError,
    MemoryLedger, MemoryStore, ProofKind, ProvenanceError, Pubkey, Versioning,
};
use r3l_node::{AttestationSubmitter, SubmitRequest, ZkProof};

fn payer() -> Pubkey {
    Pubkey::new_from_array([9; 32])
}

fn versioning() -> Versioning {
    Versioning {
        verifier_version: "0.1.0".into(),
        trust_bundle_hash: "ab".repeat(32),
    }
}

fn setup() -> (Arc<MemoryLedger>, Arc<MemoryStore>, AttestationSubmitter) {
    let ledger = Arc::new(MemoryLedger::new(ids::ATTESTATION_PROGRAM, payer()));
    let store = Arc::new(MemoryStore::new());
    let submitter = AttestationSubmitter::new(ledger.clone(), store.clone(), versioning());
    (ledger, store, submitter)
}

fn wallet_proof(seed: u8, message: &str) -> IdentityProof {
    let key = SigningKey::from_bytes(&[seed; 32]);
    IdentityProof {
        pubkey: Pubkey::new_from_array(key.verifying_key().to_bytes()),
        message: message.to_string(),
        signature: key.sign(message.as_bytes()).to_bytes(),
    }
}

fn privacy_caller() -> Caller {
    Caller::Individual {
        account_id: 7,
        email: Some("alice@example.com".into()),
        wallet: None,
        privacy_mode: true,
    }
}

#[tokio::test]
async fn test_same_content_twice_writes_once() {
    let (ledger, store, submitter) = setup();
    let id = ContentId::digest(b"photo bytes");

    let first = submitter.submit(SubmitRequest::new(id)).await.unwrap();
    assert!(!first.existing);
    assert!(first.signature.is_some());

    let second = submitter.submit(SubmitRequest::new(id)).await.unwrap();
    assert!(second.existing);
    assert_eq!(second.signature, None);
    assert_eq!(second.attestation_pda, first.attestation_pda);

    assert_eq!(ledger.transaction_count(), 1);
    assert_eq!(store.count().unwrap(), 1);
}

#[tokio::test]
async fn test_record_mirrors_ledger() {
    let (ledger, store, submitter) = setup();
    let id = ContentId::digest(b"signed photo");
    let mut request = SubmitRequest::new(id);
    request.signals = AuthenticitySignals {
        has_c2pa: true,
        trust_list_match: "official".into(),
        issuer: "Example CA".into(),
        ..Default::default()
    };

    let outcome = submitter.submit(request).await.unwrap();
    let (address, account) = lookup_attestation(ledger.as_ref(), &id).await.unwrap().unwrap();
    assert_eq!(Some(address), outcome.attestation_pda);
    assert_eq!(account.signals.issuer, "Example CA");
    assert_eq!(account.versioning, versioning());

    let record = store.get(&id).unwrap().unwrap();
    assert_eq!(record.ledger_address, Some(address));
    assert_eq!(record.tx_signature, outcome.signature);
    assert_eq!(record.signals.trust_list_match, "official");
    assert_eq!(record.proof_kind, ProofKind::TrustedVerifier);
}

#[tokio::test]
async fn test_wallet_proof_lands_on_ledger() {
    let (ledger, store, submitter) = setup();
    let id = ContentId::digest(b"wallet photo");
    let proof = wallet_proof(3, &format!("I attest {id}"));
    let wallet = proof.pubkey;

    let mut request = SubmitRequest::new(id);
    request.identity_proof = Some(proof);
    let outcome = submitter.submit(request).await.unwrap();
    assert_eq!(outcome.wallet_pubkey, Some(wallet));

    let (_, account) = lookup_attestation(ledger.as_ref(), &id).await.unwrap().unwrap();
    assert_eq!(account.identity.wallet, Some(wallet));
    assert!(account.wallet_sig.is_some());
    assert_eq!(account.proof_type, "wallet_signature");
    assert_eq!(store.get(&id).unwrap().unwrap().proof_kind, ProofKind::WalletSignature);
}

#[tokio::test]
async fn test_replayed_signature_rejected_before_any_write() {
    let (ledger, store, submitter) = setup();
    let other = ContentId::digest(b"a different item");
    let id = ContentId::digest(b"target");

    let mut request = SubmitRequest::new(id);
    request.identity_proof = Some(wallet_proof(3, &format!("I attest {other}")));
    let err = submitter.submit(request).await.unwrap_err();

    assert!(matches!(err, ProvenanceError::InvalidSignature(_)));
    assert_eq!(ledger.transaction_count(), 0);
    assert_eq!(store.count().unwrap(), 0);
}

#[tokio::test]
async fn test_privacy_mode_still_checks_signature() {
    let (ledger, store, submitter) = setup();
    let id = ContentId::digest(b"private person");
    let mut proof = wallet_proof(5, &format!("attest {id}"));
    proof.signature[10] ^= 0x01;

    let mut request = SubmitRequest::new(id);
    request.caller = Some(privacy_caller());
    request.identity_proof = Some(proof);
    let err = submitter.submit(request).await.unwrap_err();

    assert!(matches!(err, ProvenanceError::InvalidSignature(_)));
    assert_eq!(ledger.transaction_count(), 0);
    assert_eq!(store.count().unwrap(), 0);
}

#[tokio::test]
async fn test_privacy_mode_zeroes_ledger_identity_only() {
    let (ledger, store, submitter) = setup();
    let id = ContentId::digest(b"private person");
    let proof = wallet_proof(5, &format!("attest {id}"));
    let wallet = proof.pubkey;

    let mut request = SubmitRequest::new(id);
    request.caller = Some(privacy_caller());
    request.identity_proof = Some(proof);
    submitter.submit(request).await.unwrap();

    let (_, account) = lookup_attestation(ledger.as_ref(), &id).await.unwrap().unwrap();
    assert!(account.identity.is_empty());
    assert_eq!(account.wallet_sig, None);

    let record = store.get(&id).unwrap().unwrap();
    assert_eq!(record.wallet, Some(wallet));
    assert_eq!(record.email_domain.as_deref(), Some("example.com"));
    assert_eq!(record.submitter.as_deref(), Some("account:7"));
}

#[tokio::test]
async fn test_email_identity_on_ledger() {
    let (ledger, _, submitter) = setup();
    let id = ContentId::digest(b"newsroom photo");
    let mut request = SubmitRequest::new(id);
    request.caller = Some(Caller::Individual {
        account_id: 2,
        email: Some("desk@news.example".into()),
        wallet: None,
        privacy_mode: false,
    });
    let outcome = submitter.submit(request).await.unwrap();
    assert_eq!(outcome.email_domain.as_deref(), Some("news.example"));

    let (_, account) = lookup_attestation(ledger.as_ref(), &id).await.unwrap().unwrap();
    assert_eq!(account.identity.email_domain, "news.example");
    assert_eq!(
        account.identity.email_hash,
        Some(r3l_node::submitter::email_hash("desk@news.example"))
    );
}

#[tokio::test]
async fn test_private_mode_skips_ledger() {
    let (ledger, store, submitter) = setup();
    let id = ContentId::digest(b"internal memo");

    let mut request = SubmitRequest::new(id);
    request.private = true;
    let outcome = submitter.submit(request.clone()).await.unwrap();
    assert!(!outcome.existing);
    assert_eq!(outcome.attestation_pda, None);
    assert_eq!(outcome.signature, None);
    assert_eq!(ledger.transaction_count(), 0);

    let record = store.get(&id).unwrap().unwrap();
    assert!(record.is_private());
    assert_eq!(record.ledger_address, None);
    assert_eq!(record.tx_signature, None);

    let again = submitter.submit(request).await.unwrap();
    assert!(again.existing);
    assert_eq!(store.count().unwrap(), 1);
}

#[tokio::test]
async fn test_private_request_for_public_content_is_existing() {
    let (ledger, store, submitter) = setup();
    let id = ContentId::digest(b"already public");
    submitter.submit(SubmitRequest::new(id)).await.unwrap();

    let mut request = SubmitRequest::new(id);
    request.private = true;
    let outcome = submitter.submit(request).await.unwrap();
    assert!(outcome.existing);
    assert!(outcome.attestation_pda.is_some());
    assert_eq!(ledger.transaction_count(), 1);
    assert!(!store.get(&id).unwrap().unwrap().is_private());
}

#[tokio::test]
async fn test_public_request_for_private_content_is_existing() {
    let (ledger, store, submitter) = setup();
    let id = ContentId::digest(b"kept private first");

    let mut request = SubmitRequest::new(id);
    request.private = true;
    submitter.submit(request).await.unwrap();

    let outcome = submitter.submit(SubmitRequest::new(id)).await.unwrap();
    assert!(outcome.existing);
    assert_eq!(outcome.attestation_pda, None);
    assert_eq!(outcome.signature, None);
    assert_eq!(ledger.transaction_count(), 0);

    let record = store.get(&id).unwrap().unwrap();
    assert!(record.is_private());
    assert_eq!(store.count().unwrap(), 1);
}

#[tokio::test]
async fn test_ledger_failure_leaves_no_record() {
    let (ledger, store, submitter) = setup();
    ledger.fail_next_submit(LedgerError::Rejected("insufficient funds".into()));

    let err = submitter
        .submit(SubmitRequest::new(ContentId::digest(b"unlucky")))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvenanceError::LedgerRejection(_)));
    assert_eq!(store.count().unwrap(), 0);

    ledger.fail_next_submit(LedgerError::Timeout { seconds: 60 });
    let err = submitter
        .submit(SubmitRequest::new(ContentId::digest(b"slow")))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(store.count().unwrap(), 0);
}

#[tokio::test]
async fn test_zk_proof_path() {
    let (ledger, store, submitter) = setup();
    let id = ContentId::digest(b"proved");
    let mut request = SubmitRequest::new(id);
    request.zk_proof = Some(ZkProof {
        proof: vec![1, 2, 3],
        public_inputs: id.as_bytes().to_vec(),
    });
    submitter.submit(request).await.unwrap();

    let (_, account) = lookup_attestation(ledger.as_ref(), &id).await.unwrap().unwrap();
    assert_eq!(account.proof_type, "zk_proof");
    assert_eq!(store.get(&id).unwrap().unwrap().proof_kind, ProofKind::ZkProof);
}

#[tokio::test]
async fn test_overlong_signal_is_validation_error() {
    let (ledger, _, submitter) = setup();
    let mut request = SubmitRequest::new(ContentId::digest(b"verbose"));
    request.signals.issuer = "x".repeat(200);
    let err = submitter.submit(request).await.unwrap_err();
    assert!(matches!(err, ProvenanceError::Validation(_)));
    assert_eq!(ledger.transaction_count(), 0);
}

/// Ledger whose existence check always misses, as if another submitter
/// created the account between our check and our write.
struct BlindLedger(Arc<MemoryLedger>);

#[async_trait]
impl Ledger for BlindLedger {
    fn program_id(&self) -> Pubkey {
        self.0.program_id()
    }

    fn payer(&self) -> Pubkey {
        self.0.payer()
    }

    async fn get_account(&self, _address: &Pubkey) -> LedgerResult<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn submit(&self, instructions: Vec<Instruction>) -> LedgerResult<String> {
        self.0.submit(instructions).await
    }

    async fn program_accounts(&self, prefix: &[u8]) -> LedgerResult<Vec<(Pubkey, Vec<u8>)>> {
        self.0.program_accounts(prefix).await
    }
}

#[tokio::test]
async fn test_lost_race_reports_existing() {
    let inner = Arc::new(MemoryLedger::new(ids::ATTESTATION_PROGRAM, payer()));
    let id = ContentId::digest(b"contended");

    // Another node wins the race and keeps its own store.
    let winner = AttestationSubmitter::new(inner.clone(), Arc::new(MemoryStore::new()), versioning());
    let first = winner.submit(SubmitRequest::new(id)).await.unwrap();

    let store = Arc::new(MemoryStore::new());
    let loser = AttestationSubmitter::new(
        Arc::new(BlindLedger(inner.clone())),
        store.clone(),
        versioning(),
    );
    let second = loser.submit(SubmitRequest::new(id)).await.unwrap();

    assert!(!first.existing);
    assert!(second.existing);
    let (address, _) = attestation_address(&id, &ids::ATTESTATION_PROGRAM).unwrap();
    assert_eq!(second.attestation_pda, Some(address));
    assert_eq!(inner.transaction_count(), 1);
    assert_eq!(store.count().unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_submitters_one_transaction() {
    let (ledger, store, submitter) = setup();
    let submitter = Arc::new(submitter);
    let id = ContentId::digest(b"popular");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let submitter = submitter.clone();
            tokio::spawn(async move { submitter.submit(SubmitRequest::new(id)).await })
        })
        .collect();

    let mut fresh = 0;
    for handle in handles {
        if !handle.await.unwrap().unwrap().existing {
            fresh += 1;
        }
    }
    assert_eq!(fresh, 1);
    assert_eq!(ledger.transaction_count(), 1);
    assert_eq!(store.count().unwrap(), 1);
}
