use std::collections::HashSet;

use tracing::debug;

use crate::content::ContentId;
use crate::fuzzy::FuzzyHash;
use crate::record::{AttestationRecord, SimilarityFingerprint};
use crate::similarity::{dot, rank, Match, MatchTier, MAX_RESULTS};
use crate::store::{DurableStore, StoreError, StoreResult};

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn build_match(record: &AttestationRecord, distance: Option<u32>, similarity: Option<f32>) -> Match {
    Match {
        content_id: record.content_id,
        tier: MatchTier::classify(distance, similarity),
        fuzzy_hash: record.fingerprint.fuzzy_hash.clone(),
        fuzzy_distance: distance,
        embedding_similarity: similarity,
        issuer: non_empty(&record.signals.issuer),
        trust_list_match: non_empty(&record.signals.trust_list_match),
        has_c2pa: record.signals.has_c2pa,
        created_at: record.created_at,
    }
}

fn parse_stored(record: &AttestationRecord) -> Option<FuzzyHash> {
    let raw = record.fingerprint.fuzzy_hash.as_deref()?;
    match raw.parse() {
        Ok(hash) => Some(hash),
        Err(e) => {
            debug!(content_id = %record.content_id, error = %e, "skipping unparseable fuzzy hash");
            None
        }
    }
}

/// Ranked similarity search over a [`DurableStore`].
pub struct SimilarityMatcher<'a> {
    store: &'a dyn DurableStore,
}

impl<'a> SimilarityMatcher<'a> {
    pub fn new(store: &'a dyn DurableStore) -> Self {
        Self { store }
    }

    /// Matches for a query item.
    ///
    /// If `content_id` is already stored it leads the results as an exact
    /// match and is not scanned again.
    pub fn find(
        &self,
        content_id: Option<&ContentId>,
        fingerprint: &SimilarityFingerprint,
    ) -> StoreResult<Vec<Match>> {
        let mut seen = HashSet::new();
        let mut matches = Vec::new();

        if let Some(id) = content_id {
            if let Some(record) = self.store.get(id)? {
                matches.push(Match {
                    tier: MatchTier::Exact,
                    ..build_match(&record, Some(0), Some(1.0))
                });
                seen.insert(*id);
            }
        }

        self.scan(fingerprint, &mut seen, &mut matches)?;
        Ok(rank(matches))
    }

    /// Matches for an item already in the store, excluding the item itself.
    pub fn find_by_hash(&self, content_id: &ContentId) -> StoreResult<Vec<Match>> {
        let record = self
            .store
            .get(content_id)?
            .ok_or_else(|| StoreError::NotFound(content_id.to_hex()))?;

        let mut seen = HashSet::from([*content_id]);
        let mut matches = Vec::new();
        self.scan(&record.fingerprint, &mut seen, &mut matches)?;
        Ok(rank(matches))
    }

    fn scan(
        &self,
        fingerprint: &SimilarityFingerprint,
        seen: &mut HashSet<ContentId>,
        matches: &mut Vec<Match>,
    ) -> StoreResult<()> {
        let query_hash = fingerprint
            .fuzzy_hash
            .as_deref()
            .and_then(|h| h.parse::<FuzzyHash>().ok());
        let query_embedding = fingerprint.embedding.as_deref();

        if let Some(query_hash) = &query_hash {
            let candidates = self.store.with_fuzzy_hash()?;
            debug!(candidates = candidates.len(), "fuzzy hash scan");
            for record in candidates {
                if seen.contains(&record.content_id) {
                    continue;
                }
                let Some(stored) = parse_stored(&record) else {
                    continue;
                };
                let distance = query_hash.distance(&stored);
                let similarity = match (query_embedding, record.fingerprint.embedding.as_deref()) {
                    (Some(q), Some(s)) if q.len() == s.len() => Some(dot(q, s)),
                    _ => None,
                };
                seen.insert(record.content_id);
                matches.push(build_match(&record, Some(distance), similarity));
            }
        }

        if let Some(query_embedding) = query_embedding {
            let neighbors = self.store.nearest(query_embedding, MAX_RESULTS)?;
            debug!(neighbors = neighbors.len(), "embedding nearest-neighbour pass");
            for neighbor in neighbors {
                let record = &neighbor.record;
                if !seen.insert(record.content_id) {
                    continue;
                }
                let distance = match (&query_hash, parse_stored(record)) {
                    (Some(q), Some(s)) => Some(q.distance(&s)),
                    _ => None,
                };
                matches.push(build_match(record, distance, Some(neighbor.similarity)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuzzy;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn lcg_bytes(n: usize, seed: u64) -> Vec<u8> {
        let mut x = seed;
        (0..n)
            .map(|_| {
                x = (x.wrapping_mul(1_103_515_245).wrapping_add(12_345)) % (1 << 31);
                ((x >> 16) & 0xff) as u8
            })
            .collect()
    }

    fn stored(seed: &[u8], fuzzy_hash: Option<String>, embedding: Option<Vec<f32>>) -> AttestationRecord {
        let mut record = AttestationRecord::new(ContentId::digest(seed));
        record.fingerprint = SimilarityFingerprint {
            fuzzy_hash,
            embedding,
        };
        record
    }

    #[test]
    fn test_exact_shortcut_only_without_fingerprint() {
        let existing = stored(b"x", None, Some(vec![1.0, 0.0]));
        let store = MemoryStore::with_records(vec![existing.clone(), stored(b"y", None, Some(vec![1.0, 0.0]))]);
        let matcher = SimilarityMatcher::new(&store);

        let results = matcher
            .find(Some(&existing.content_id), &SimilarityFingerprint::default())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tier, MatchTier::Exact);
        assert_eq!(results[0].fuzzy_distance, Some(0));
        assert_eq!(results[0].embedding_similarity, Some(1.0));
    }

    #[test]
    fn test_fuzzy_and_embedding_passes_merge() {
        let base = lcg_bytes(1000, 42);
        let mut edited = base.clone();
        for i in (0..edited.len()).step_by(100) {
            edited[i] ^= 0xff;
        }
        let query_hash = fuzzy::hash(&base).unwrap();
        let near_hash = fuzzy::hash(&edited).unwrap();
        let far_hash = fuzzy::hash(&lcg_bytes(4000, 7)).unwrap();

        let near = stored(b"near", Some(near_hash), Some(vec![1.0, 0.0]));
        let far = stored(b"far", Some(far_hash), None);
        let visual = stored(b"visual", None, Some(vec![0.8, 0.6]));
        let store = MemoryStore::with_records(vec![near.clone(), far.clone(), visual.clone()]);

        let query = SimilarityFingerprint {
            fuzzy_hash: Some(query_hash),
            embedding: Some(vec![1.0, 0.0]),
        };
        let results = SimilarityMatcher::new(&store).find(None, &query).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].content_id, near.content_id);
        assert_eq!(results[0].tier, MatchTier::NearDuplicate);
        assert_eq!(results[0].fuzzy_distance, Some(50));
        assert_eq!(results[0].embedding_similarity, Some(1.0));

        assert_eq!(results[1].content_id, visual.content_id);
        assert_eq!(results[1].tier, MatchTier::VisualMatch);
        assert_eq!(results[1].fuzzy_distance, None);

        assert_eq!(results[2].content_id, far.content_id);
        assert_eq!(results[2].tier, MatchTier::Unrelated);
    }

    #[test]
    fn test_find_by_hash_excludes_self() {
        let a = stored(b"a", None, Some(vec![1.0, 0.0]));
        let b = stored(b"b", None, Some(vec![0.9, 0.43588989]));
        let store = MemoryStore::with_records(vec![a.clone(), b.clone()]);
        let matcher = SimilarityMatcher::new(&store);

        let results = matcher.find_by_hash(&a.content_id).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content_id, b.content_id);
        assert_eq!(results[0].tier, MatchTier::VisualMatch);

        assert!(matches!(
            matcher.find_by_hash(&ContentId::digest(b"missing")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_unparseable_stored_hash_is_skipped() {
        let broken = stored(b"broken", Some("T1ZZ".into()), None);
        let store = MemoryStore::with_records(vec![broken]);
        let query = SimilarityFingerprint {
            fuzzy_hash: fuzzy::hash(&lcg_bytes(1000, 42)),
            embedding: None,
        };
        assert!(SimilarityMatcher::new(&store).find(None, &query).unwrap().is_empty());
    }
}
