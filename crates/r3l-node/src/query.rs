//! Trust verdicts and listings.

use std::sync::Arc;

use r3l_core::ledger::{list_attestations, lookup_attestation};
use r3l_core::{
    AttestationRecord, ContentId, DurableStore, Ledger, ProvenanceError, Result, StoreError,
    TrustPolicy, Verdict, Visibility,
};
use tracing::{debug, warn};

use crate::tracing::prefix;

/// Most hashes accepted by one batch query.
pub const MAX_BATCH: usize = 50;

/// Answers "what do we know about this content?" from the durable store,
/// falling back to the ledger.
pub struct QueryService {
    store: Arc<dyn DurableStore>,
    ledger: Arc<dyn Ledger>,
    policy: TrustPolicy,
}

impl QueryService {
    pub fn new(store: Arc<dyn DurableStore>, ledger: Arc<dyn Ledger>, policy: TrustPolicy) -> Self {
        Self {
            store,
            ledger,
            policy,
        }
    }

    /// Verdict for `content_id`; `unknown` with an error note when neither
    /// layer has it.
    pub async fn query(&self, content_id: &ContentId) -> Result<Verdict> {
        Ok(self
            .lookup(content_id)
            .await?
            .unwrap_or_else(|| Verdict::unknown(content_id).with_error("no attestation found")))
    }

    /// [`query`](Self::query) for a hex-encoded hash.
    pub async fn query_hex(&self, hash: &str) -> Result<Verdict> {
        let content_id: ContentId = hash.parse()?;
        self.query(&content_id).await
    }

    /// Verdicts in request order. Unknown hashes get a bare `unknown` entry.
    pub async fn query_batch(&self, hashes: &[String]) -> Result<Vec<Verdict>> {
        if hashes.len() > MAX_BATCH {
            return Err(ProvenanceError::Validation(format!(
                "max {MAX_BATCH} hashes per batch request"
            )));
        }
        let ids = hashes
            .iter()
            .map(|h| h.parse::<ContentId>())
            .collect::<Result<Vec<_>>>()?;

        let mut verdicts = Vec::with_capacity(ids.len());
        for id in &ids {
            let verdict = self.lookup(id).await?;
            verdicts.push(verdict.unwrap_or_else(|| Verdict::unknown(id)));
        }
        Ok(verdicts)
    }

    async fn lookup(&self, content_id: &ContentId) -> Result<Option<Verdict>> {
        match self.stored(content_id).await {
            Ok(Some(record)) => return Ok(Some(self.policy.from_record(&record))),
            Ok(None) => {}
            Err(StoreError::InvalidData(reason)) => {
                warn!("{} unreadable record for {content_id}: {reason}", prefix::DB);
            }
            Err(e) => return Err(e.into()),
        }

        debug!("{} {content_id} not in store, asking ledger", prefix::LEDGER);
        let found = lookup_attestation(self.ledger.as_ref(), content_id).await?;
        Ok(found.map(|(address, account)| self.policy.from_account(&address, &account)))
    }

    async fn stored(&self, content_id: &ContentId) -> std::result::Result<Option<AttestationRecord>, StoreError> {
        let store = self.store.clone();
        let id = *content_id;
        tokio::task::spawn_blocking(move || store.get(&id))
            .await
            .map_err(|e| StoreError::Backend(format!("store worker: {e}")))?
    }

    /// Durable records, newest first.
    pub async fn list(
        &self,
        visibility: Visibility,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AttestationRecord>> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.list(visibility, limit, offset))
            .await
            .map_err(|e| ProvenanceError::Internal(format!("store worker: {e}")))?
            .map_err(ProvenanceError::from)
    }

    /// Verdicts for every attestation account on the ledger, newest first.
    pub async fn list_onchain(&self, offset: usize, limit: usize) -> Result<Vec<Verdict>> {
        let accounts = list_attestations(self.ledger.as_ref(), offset, limit).await?;
        Ok(accounts
            .iter()
            .map(|(address, account)| self.policy.from_account(address, account))
            .collect())
    }
}
