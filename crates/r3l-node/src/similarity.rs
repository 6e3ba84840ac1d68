//! Similarity search over attested content.

use std::sync::Arc;

use r3l_core::{
    fuzzy, ContentId, DurableStore, Match, ProvenanceError, Result, SimilarityFingerprint,
    SimilarityMatcher,
};
use tracing::info;

use crate::embed::EmbedderPool;
use crate::tracing::prefix;

/// Fingerprints content and ranks stored attestations against it.
pub struct SimilarityService {
    store: Arc<dyn DurableStore>,
    embedder: Option<EmbedderPool>,
}

impl SimilarityService {
    /// Without an embedder only fuzzy hashes are compared.
    pub fn new(store: Arc<dyn DurableStore>, embedder: Option<EmbedderPool>) -> Self {
        Self { store, embedder }
    }

    /// Fuzzy hash and embedding of `bytes`. Either may be absent.
    pub async fn fingerprint(&self, bytes: &[u8], mime: Option<&str>) -> Result<SimilarityFingerprint> {
        let owned = bytes.to_vec();
        let fuzzy_hash = tokio::task::spawn_blocking(move || fuzzy::hash(&owned))
            .await
            .map_err(|e| ProvenanceError::Internal(format!("fuzzy hash worker: {e}")))?;
        let embedding = match &self.embedder {
            Some(pool) => pool.embed(bytes, mime).await?,
            None => None,
        };
        Ok(SimilarityFingerprint {
            fuzzy_hash,
            embedding,
        })
    }

    /// Ranked matches for an uploaded item.
    pub async fn find_similar(&self, bytes: &[u8], mime: Option<&str>) -> Result<Vec<Match>> {
        let content_id = ContentId::digest(bytes);
        let fingerprint = self.fingerprint(bytes, mime).await?;
        self.find(Some(content_id), fingerprint).await
    }

    /// Ranked matches for a fingerprint; `content_id`, if already stored,
    /// leads as an exact match.
    pub async fn find(
        &self,
        content_id: Option<ContentId>,
        fingerprint: SimilarityFingerprint,
    ) -> Result<Vec<Match>> {
        let store = self.store.clone();
        let matches = tokio::task::spawn_blocking(move || {
            SimilarityMatcher::new(store.as_ref()).find(content_id.as_ref(), &fingerprint)
        })
        .await
        .map_err(|e| ProvenanceError::Internal(format!("similarity worker: {e}")))??;
        info!("{} {} matches", prefix::SIMILAR, matches.len());
        Ok(matches)
    }

    /// Ranked matches for an attested item, excluding itself.
    pub async fn find_by_hash(&self, content_id: ContentId) -> Result<Vec<Match>> {
        let store = self.store.clone();
        let matches = tokio::task::spawn_blocking(move || {
            SimilarityMatcher::new(store.as_ref()).find_by_hash(&content_id)
        })
        .await
        .map_err(|e| ProvenanceError::Internal(format!("similarity worker: {e}")))??;
        Ok(matches)
    }
}
