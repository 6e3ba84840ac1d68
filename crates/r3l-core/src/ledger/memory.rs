//! In-process ledger emulating the attestation program.
//!
//! Instructions are checked the way the runtime and program would: the
//! signature precompile must verify, a wallet named in the attestation must
//! match the precompile's key, the target account must be the derived
//! address, and an account can only be created once. A transaction either
//! applies completely or not at all.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::address::{attestation_address, ids, Pubkey};
use crate::codec::{
    decode_compute_unit_limit, AttestationAccount, Ed25519Verification, ProgramInstruction,
};
use crate::identity;
use crate::ledger::{Instruction, Ledger, LedgerError, LedgerResult};
use crate::record::{AuthenticitySignals, ProofKind};

#[derive(Default)]
struct State {
    accounts: BTreeMap<Pubkey, Vec<u8>>,
    transactions: Vec<String>,
    fail_next: Option<LedgerError>,
}

pub struct MemoryLedger {
    program_id: Pubkey,
    payer: Pubkey,
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new(program_id: Pubkey, payer: Pubkey) -> Self {
        Self {
            program_id,
            payer,
            state: Mutex::new(State::default()),
        }
    }

    /// Committed transactions so far.
    pub fn transaction_count(&self) -> usize {
        self.state.lock().transactions.len()
    }

    pub fn account_count(&self) -> usize {
        self.state.lock().accounts.len()
    }

    /// Make the next `submit` fail with `err` without touching state.
    pub fn fail_next_submit(&self, err: LedgerError) {
        self.state.lock().fail_next = Some(err);
    }

    /// Place raw bytes at `address`, bypassing the program.
    pub fn put_account(&self, address: Pubkey, data: Vec<u8>) {
        self.state.lock().accounts.insert(address, data);
    }

    fn execute(&self, state: &State, instructions: &[Instruction]) -> LedgerResult<(Pubkey, Vec<u8>)> {
        let mut verified: Option<Ed25519Verification> = None;
        let mut created: Option<(Pubkey, Vec<u8>)> = None;

        for ix in instructions {
            if ix.program_id == ids::COMPUTE_BUDGET_PROGRAM {
                decode_compute_unit_limit(&ix.data)?;
            } else if ix.program_id == ids::ED25519_PROGRAM {
                let payload = Ed25519Verification::decode(&ix.data)?;
                identity::verify(payload.pubkey.as_bytes(), &payload.message, &payload.signature)
                    .map_err(|e| LedgerError::Rejected(format!("precompile: {e}")))?;
                verified = Some(payload);
            } else if ix.program_id == self.program_id {
                if created.is_some() {
                    return Err(LedgerError::Rejected("duplicate program instruction".into()));
                }
                created = Some(self.create_account(state, ix, verified.as_ref())?);
            } else {
                return Err(LedgerError::Rejected(format!("unknown program {}", ix.program_id)));
            }
        }

        created.ok_or_else(|| LedgerError::Rejected("no program instruction".into()))
    }

    fn create_account(
        &self,
        state: &State,
        ix: &Instruction,
        verified: Option<&Ed25519Verification>,
    ) -> LedgerResult<(Pubkey, Vec<u8>)> {
        let decoded = ProgramInstruction::decode(&ix.data)?;
        let (address, bump) = attestation_address(decoded.content_id(), &self.program_id)?;

        let target = ix
            .accounts
            .first()
            .ok_or_else(|| LedgerError::Rejected("missing attestation account".into()))?;
        if target.pubkey != address {
            return Err(LedgerError::Rejected("seeds constraint violated".into()));
        }
        if state.accounts.contains_key(&address) {
            return Err(LedgerError::AlreadyExists(format!("account {address} already in use")));
        }

        let content_id = *decoded.content_id();
        let identity = decoded.identity().clone();
        let wallet_sig = match identity.wallet {
            Some(wallet) => match verified {
                Some(payload) if payload.pubkey == wallet => Some(payload.signature),
                _ => return Err(LedgerError::Rejected("wallet signature not verified".into())),
            },
            None => None,
        };

        let (signals, versioning, proof_type) = match decoded {
            ProgramInstruction::Attestation(att) => {
                let kind = if wallet_sig.is_some() {
                    ProofKind::WalletSignature
                } else {
                    ProofKind::TrustedVerifier
                };
                (att.signals, att.versioning, kind)
            }
            ProgramInstruction::Proof(proof) => {
                (AuthenticitySignals::default(), proof.versioning, ProofKind::ZkProof)
            }
        };

        let account = AttestationAccount {
            content_id,
            signals,
            submitted_by: self.payer,
            timestamp: chrono::Utc::now().timestamp(),
            bump,
            proof_type: proof_type.as_str().to_string(),
            identity,
            wallet_sig,
            versioning,
        };
        Ok((address, account.encode()))
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    fn program_id(&self) -> Pubkey {
        self.program_id
    }

    fn payer(&self) -> Pubkey {
        self.payer
    }

    async fn get_account(&self, address: &Pubkey) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self.state.lock().accounts.get(address).cloned())
    }

    async fn submit(&self, instructions: Vec<Instruction>) -> LedgerResult<String> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }

        let (address, data) = self.execute(&state, &instructions)?;

        let mut hasher = Sha256::new();
        hasher.update(state.transactions.len().to_le_bytes());
        for ix in &instructions {
            hasher.update(&ix.data);
        }
        let signature = bs58::encode(hasher.finalize()).into_string();

        debug!(%address, %signature, "memory ledger committed");
        state.accounts.insert(address, data);
        state.transactions.push(signature.clone());
        Ok(signature)
    }

    async fn program_accounts(&self, prefix: &[u8]) -> LedgerResult<Vec<(Pubkey, Vec<u8>)>> {
        Ok(self
            .state
            .lock()
            .accounts
            .iter()
            .filter(|(_, data)| data.starts_with(prefix))
            .map(|(address, data)| (*address, data.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AttestationInstruction, ProofInstruction};
    use crate::content::ContentId;
    use crate::identity::testing::{sign, signing_key};
    use crate::ledger::instruction::{attestation_program, attestation_transaction};
    use crate::record::LedgerIdentity;

    fn ledger() -> MemoryLedger {
        MemoryLedger::new(ids::ATTESTATION_PROGRAM, Pubkey::new_from_array([9; 32]))
    }

    fn attest(ledger: &MemoryLedger, content: ContentId, identity: LedgerIdentity) -> Instruction {
        let (address, _) = attestation_address(&content, &ledger.program_id).unwrap();
        let ix = ProgramInstruction::Attestation(AttestationInstruction {
            content_id: content,
            signals: AuthenticitySignals {
                issuer: "Example CA".into(),
                ..Default::default()
            },
            identity,
            versioning: Default::default(),
        });
        attestation_program(ledger.program_id, address, ledger.payer, &ix).unwrap()
    }

    #[tokio::test]
    async fn test_account_created_once() {
        let ledger = ledger();
        let content = ContentId::digest(b"hello");

        let ixs = attestation_transaction(200_000, None, attest(&ledger, content, Default::default())).unwrap();
        ledger.submit(ixs.clone()).await.unwrap();

        let err = ledger.submit(ixs).await.unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(ledger.transaction_count(), 1);

        let (address, _) = attestation_address(&content, &ledger.program_id).unwrap();
        let data = ledger.get_account(&address).await.unwrap().unwrap();
        let account = AttestationAccount::decode(&data).unwrap();
        assert_eq!(account.signals.issuer, "Example CA");
        assert_eq!(account.submitted_by, ledger.payer);
        assert_eq!(account.proof_type, "trusted_verifier");
    }

    #[tokio::test]
    async fn test_wallet_requires_matching_precompile() {
        let ledger = ledger();
        let content = ContentId::digest(b"hello");
        let key = signing_key(4);
        let proof = sign(&key, &format!("attest {content}"));
        let identity = LedgerIdentity::with_wallet(proof.pubkey);

        let missing = attestation_transaction(1, None, attest(&ledger, content, identity.clone())).unwrap();
        assert!(matches!(ledger.submit(missing).await, Err(LedgerError::Rejected(_))));

        let payload = proof.precompile();
        let ixs = attestation_transaction(1, Some(&payload), attest(&ledger, content, identity)).unwrap();
        ledger.submit(ixs).await.unwrap();

        let (address, _) = attestation_address(&content, &ledger.program_id).unwrap();
        let account = AttestationAccount::decode(&ledger.get_account(&address).await.unwrap().unwrap()).unwrap();
        assert_eq!(account.wallet_sig, Some(proof.signature));
        assert_eq!(account.proof_type, "wallet_signature");
    }

    #[tokio::test]
    async fn test_bad_precompile_rejects_whole_transaction() {
        let ledger = ledger();
        let content = ContentId::digest(b"hello");
        let mut proof = sign(&signing_key(4), &format!("attest {content}"));
        proof.signature[10] ^= 0xff;

        let ixs = attestation_transaction(1, Some(&proof.precompile()), attest(&ledger, content, Default::default()))
            .unwrap();
        assert!(matches!(ledger.submit(ixs).await, Err(LedgerError::Rejected(_))));
        assert_eq!(ledger.account_count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_target_address_rejected() {
        let ledger = ledger();
        let mut ix = attest(&ledger, ContentId::digest(b"a"), Default::default());
        ix.accounts[0].pubkey = Pubkey::new_from_array([1; 32]);
        let ixs = attestation_transaction(1, None, ix).unwrap();
        assert!(matches!(ledger.submit(ixs).await, Err(LedgerError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_proof_instruction_creates_zk_account() {
        let ledger = ledger();
        let content = ContentId::digest(b"zk");
        let (address, _) = attestation_address(&content, &ledger.program_id).unwrap();
        let ix = ProgramInstruction::Proof(ProofInstruction {
            proof: vec![1, 2, 3],
            public_inputs: vec![4, 5],
            content_id: content,
            identity: Default::default(),
            versioning: Default::default(),
        });
        let call = attestation_program(ledger.program_id, address, ledger.payer, &ix).unwrap();
        ledger.submit(attestation_transaction(1, None, call).unwrap()).await.unwrap();

        let account = AttestationAccount::decode(&ledger.get_account(&address).await.unwrap().unwrap()).unwrap();
        assert_eq!(account.proof_type, "zk_proof");
    }

    #[tokio::test]
    async fn test_injected_failure_leaves_state_untouched() {
        let ledger = ledger();
        ledger.fail_next_submit(LedgerError::Rpc("connection reset".into()));
        let ixs = attestation_transaction(1, None, attest(&ledger, ContentId::digest(b"a"), Default::default()))
            .unwrap();
        assert_eq!(
            ledger.submit(ixs.clone()).await.unwrap_err(),
            LedgerError::Rpc("connection reset".into())
        );
        assert_eq!(ledger.account_count(), 0);
        ledger.submit(ixs).await.unwrap();
        assert_eq!(ledger.transaction_count(), 1);
    }
}
