//! Storage trait definitions

use crate::content::ContentId;
use crate::record::AttestationRecord;
use crate::store::error::StoreResult;

/// Which records a listing may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Skip records flagged private
    #[default]
    Public,
    All,
}

/// A nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub record: AttestationRecord,
    /// Cosine similarity to the query, `1 - cosine distance`.
    pub similarity: f32,
}

/// Durable mirror of ledger attestations, keyed by content identifier.
///
/// Shared by every request without request-level locking; uniqueness on
/// the content identifier is the store's job, via insert-or-ignore.
pub trait DurableStore: Send + Sync {
    /// Insert `record` unless one with the same content id exists.
    ///
    /// Returns `true` if this call inserted the row. A concurrent writer
    /// getting there first is not an error.
    fn insert_or_ignore(&self, record: &AttestationRecord) -> StoreResult<bool>;

    /// Point lookup.
    fn get(&self, id: &ContentId) -> StoreResult<Option<AttestationRecord>>;

    fn exists(&self, id: &ContentId) -> StoreResult<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Newest first.
    fn list(&self, visibility: Visibility, limit: usize, offset: usize) -> StoreResult<Vec<AttestationRecord>>;

    /// Every record carrying a fuzzy hash. No pre-filtering.
    fn with_fuzzy_hash(&self) -> StoreResult<Vec<AttestationRecord>>;

    /// Up to `k` records closest to `embedding` by cosine distance, closest first.
    fn nearest(&self, embedding: &[f32], k: usize) -> StoreResult<Vec<Neighbor>>;

    fn count(&self) -> StoreResult<usize>;
}
