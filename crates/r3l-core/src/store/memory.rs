//! In-memory storage backend
//!
//! A HashMap-based implementation for testing and development.
//! Not suitable for production use due to lack of persistence.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::content::ContentId;
use crate::record::AttestationRecord;
use crate::similarity::cosine_similarity;
use crate::store::error::StoreResult;
use crate::store::traits::{DurableStore, Neighbor, Visibility};

/// In-memory attestation store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<ContentId, AttestationRecord>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory store with initial records.
    pub fn with_records(records: Vec<AttestationRecord>) -> Self {
        let store = Self::new();
        for record in records {
            let _ = store.insert_or_ignore(&record);
        }
        store
    }

    fn newest_first(mut records: Vec<AttestationRecord>) -> Vec<AttestationRecord> {
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.content_id.cmp(&b.content_id))
        });
        records
    }
}

impl DurableStore for MemoryStore {
    fn insert_or_ignore(&self, record: &AttestationRecord) -> StoreResult<bool> {
        let mut records = self.records.write();
        if records.contains_key(&record.content_id) {
            return Ok(false);
        }
        records.insert(record.content_id, record.clone());
        Ok(true)
    }

    fn get(&self, id: &ContentId) -> StoreResult<Option<AttestationRecord>> {
        Ok(self.records.read().get(id).cloned())
    }

    fn list(&self, visibility: Visibility, limit: usize, offset: usize) -> StoreResult<Vec<AttestationRecord>> {
        let visible: Vec<AttestationRecord> = self
            .records
            .read()
            .values()
            .filter(|r| visibility == Visibility::All || !r.is_private())
            .cloned()
            .collect();
        Ok(Self::newest_first(visible)
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    fn with_fuzzy_hash(&self) -> StoreResult<Vec<AttestationRecord>> {
        let rows = self
            .records
            .read()
            .values()
            .filter(|r| r.fingerprint.fuzzy_hash.is_some())
            .cloned()
            .collect();
        Ok(Self::newest_first(rows))
    }

    fn nearest(&self, embedding: &[f32], k: usize) -> StoreResult<Vec<Neighbor>> {
        let mut hits: Vec<Neighbor> = self
            .records
            .read()
            .values()
            .filter_map(|r| {
                let stored = r.fingerprint.embedding.as_deref()?;
                (stored.len() == embedding.len()).then(|| Neighbor {
                    similarity: cosine_similarity(embedding, stored),
                    record: r.clone(),
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.record.content_id.cmp(&b.record.content_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.records.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(seed: &[u8], created_at: i64) -> AttestationRecord {
        let mut r = AttestationRecord::new(ContentId::digest(seed));
        r.created_at = created_at;
        r
    }

    #[test]
    fn test_insert_or_ignore_is_idempotent() {
        let store = MemoryStore::new();
        let r = record(b"a", 1);
        assert!(store.insert_or_ignore(&r).unwrap());

        let mut dup = r.clone();
        dup.signals.issuer = "someone else".into();
        assert!(!store.insert_or_ignore(&dup).unwrap());

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get(&r.content_id).unwrap().unwrap().signals.issuer, "");
    }

    #[test]
    fn test_list_filters_private_newest_first() {
        let mut private = record(b"p", 3);
        private.content.private = true;
        let store = MemoryStore::with_records(vec![record(b"a", 1), record(b"b", 2), private]);

        let public = store.list(Visibility::Public, 10, 0).unwrap();
        assert_eq!(public.len(), 2);
        assert_eq!(public[0].created_at, 2);

        let all = store.list(Visibility::All, 10, 0).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].is_private());

        let page = store.list(Visibility::All, 1, 1).unwrap();
        assert_eq!(page[0].created_at, 2);
    }

    #[test]
    fn test_nearest_orders_by_similarity() {
        let mut near = record(b"near", 1);
        near.fingerprint.embedding = Some(vec![1.0, 0.0]);
        let mut far = record(b"far", 1);
        far.fingerprint.embedding = Some(vec![0.0, 1.0]);
        let mut wrong_dim = record(b"dim", 1);
        wrong_dim.fingerprint.embedding = Some(vec![1.0, 0.0, 0.0]);
        let store = MemoryStore::with_records(vec![far, near.clone(), wrong_dim, record(b"none", 1)]);

        let hits = store.nearest(&[0.8, 0.6], 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.content_id, near.content_id);
        assert!((hits[0].similarity - 0.8).abs() < 1e-6);
    }
}
