//! Content similarity: tier classification, ranking and vector math.
//!
//! Two fingerprints feed the matcher. The fuzzy hash gives a distance
//! (lower is closer, 0 is identical) and the embedding gives a cosine
//! similarity in `[-1, 1]`. A candidate may carry either or both.

mod matcher;

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::content::ContentId;

pub use matcher::SimilarityMatcher;

/// Results returned by a single search.
pub const MAX_RESULTS: usize = 20;

pub const EXACT_MIN_SIMILARITY: f32 = 0.95;
pub const NEAR_DUPLICATE_MAX_DISTANCE: u32 = 100;
pub const NEAR_DUPLICATE_MIN_SIMILARITY: f32 = 0.85;
pub const VISUAL_MATCH_MIN_SIMILARITY: f32 = 0.6;

/// Fuzzy distance used for sorting when a match has none.
const ABSENT_DISTANCE: u32 = u32::MAX;

/// Match tiers, declared in rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    NearDuplicate,
    VisualMatch,
    Unrelated,
}

impl MatchTier {
    /// Classify a candidate. First matching rule wins.
    pub fn classify(distance: Option<u32>, similarity: Option<f32>) -> Self {
        let sim_at_least = |min: f32| similarity.map_or(true, |s| s >= min);

        if distance == Some(0) && sim_at_least(EXACT_MIN_SIMILARITY) {
            return MatchTier::Exact;
        }
        if distance.is_some_and(|d| d <= NEAR_DUPLICATE_MAX_DISTANCE)
            && sim_at_least(NEAR_DUPLICATE_MIN_SIMILARITY)
        {
            return MatchTier::NearDuplicate;
        }
        if similarity.is_some_and(|s| s >= VISUAL_MATCH_MIN_SIMILARITY) {
            return MatchTier::VisualMatch;
        }
        MatchTier::Unrelated
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::Exact => "exact",
            MatchTier::NearDuplicate => "near_duplicate",
            MatchTier::VisualMatch => "visual_match",
            MatchTier::Unrelated => "unrelated",
        }
    }
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub content_id: ContentId,
    #[serde(rename = "match_type")]
    pub tier: MatchTier,
    pub fuzzy_hash: Option<String>,
    pub fuzzy_distance: Option<u32>,
    pub embedding_similarity: Option<f32>,
    pub issuer: Option<String>,
    pub trust_list_match: Option<String>,
    pub has_c2pa: bool,
    pub created_at: i64,
}

impl Match {
    fn ranking(a: &Match, b: &Match) -> Ordering {
        a.tier
            .cmp(&b.tier)
            .then_with(|| {
                let sa = a.embedding_similarity.unwrap_or(0.0);
                let sb = b.embedding_similarity.unwrap_or(0.0);
                sb.total_cmp(&sa)
            })
            .then_with(|| {
                let da = a.fuzzy_distance.unwrap_or(ABSENT_DISTANCE);
                let db = b.fuzzy_distance.unwrap_or(ABSENT_DISTANCE);
                da.cmp(&db)
            })
    }
}

/// Sort by tier, then similarity descending, then distance ascending, and
/// keep the first [`MAX_RESULTS`].
pub fn rank(mut matches: Vec<Match>) -> Vec<Match> {
    matches.sort_by(Match::ranking);
    matches.truncate(MAX_RESULTS);
    matches
}

/// Dot product. Equals cosine similarity for unit vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine similarity; 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

/// Scale `v` to unit length in place. Zero vectors are left alone.
pub fn normalize(v: &mut [f32]) {
    let norm = dot(v, v).sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hit(seed: &[u8], tier: MatchTier, distance: Option<u32>, similarity: Option<f32>) -> Match {
        Match {
            content_id: ContentId::digest(seed),
            tier,
            fuzzy_hash: None,
            fuzzy_distance: distance,
            embedding_similarity: similarity,
            issuer: None,
            trust_list_match: None,
            has_c2pa: false,
            created_at: 0,
        }
    }

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(MatchTier::classify(Some(100), None), MatchTier::NearDuplicate);
        assert_eq!(MatchTier::classify(Some(101), Some(0.9)), MatchTier::VisualMatch);
        assert_eq!(MatchTier::classify(None, Some(0.6)), MatchTier::VisualMatch);
        assert_eq!(MatchTier::classify(None, Some(0.59)), MatchTier::Unrelated);
    }

    #[test]
    fn test_classify_exact() {
        assert_eq!(MatchTier::classify(Some(0), None), MatchTier::Exact);
        assert_eq!(MatchTier::classify(Some(0), Some(0.95)), MatchTier::Exact);
        // identical bytes but the embedding disagrees
        assert_eq!(MatchTier::classify(Some(0), Some(0.9)), MatchTier::NearDuplicate);
        assert_eq!(MatchTier::classify(Some(0), Some(0.7)), MatchTier::VisualMatch);
    }

    #[test]
    fn test_classify_without_fingerprints() {
        assert_eq!(MatchTier::classify(None, None), MatchTier::Unrelated);
        assert_eq!(MatchTier::classify(Some(250), None), MatchTier::Unrelated);
        assert_eq!(MatchTier::classify(Some(50), Some(0.84)), MatchTier::VisualMatch);
    }

    #[test]
    fn test_rank_orders_by_tier() {
        let ranked = rank(vec![
            hit(b"v", MatchTier::VisualMatch, None, Some(0.7)),
            hit(b"n", MatchTier::NearDuplicate, Some(50), Some(0.9)),
            hit(b"e", MatchTier::Exact, Some(0), Some(1.0)),
        ]);
        let tiers: Vec<MatchTier> = ranked.iter().map(|m| m.tier).collect();
        assert_eq!(
            tiers,
            vec![MatchTier::Exact, MatchTier::NearDuplicate, MatchTier::VisualMatch]
        );
    }

    #[test]
    fn test_rank_within_tier() {
        let ranked = rank(vec![
            hit(b"a", MatchTier::NearDuplicate, Some(10), None),
            hit(b"b", MatchTier::NearDuplicate, Some(90), Some(0.9)),
            hit(b"c", MatchTier::NearDuplicate, None, None),
            hit(b"d", MatchTier::NearDuplicate, Some(5), None),
        ]);
        let ids: Vec<ContentId> = ranked.iter().map(|m| m.content_id).collect();
        assert_eq!(
            ids,
            vec![
                ContentId::digest(b"b"),
                ContentId::digest(b"d"),
                ContentId::digest(b"a"),
                ContentId::digest(b"c"),
            ]
        );
    }

    #[test]
    fn test_rank_truncates() {
        let many = (0..30u32)
            .map(|i| hit(&i.to_le_bytes(), MatchTier::VisualMatch, None, Some(0.7)))
            .collect();
        assert_eq!(rank(many).len(), MAX_RESULTS);
    }

    #[test]
    fn test_vector_math() {
        assert_eq!(dot(&[1.0, 2.0], &[3.0, 4.0]), 11.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 1.0]) - 0.70710677).abs() < 1e-6);

        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.6, 0.8]);
    }

    #[test]
    fn test_match_serializes_tier_as_match_type() {
        let json = serde_json::to_value(hit(b"x", MatchTier::NearDuplicate, Some(3), None)).unwrap();
        assert_eq!(json["match_type"], "near_duplicate");
        assert_eq!(json["fuzzy_distance"], 3);
    }
}
