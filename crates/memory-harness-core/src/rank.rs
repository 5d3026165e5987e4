//! Hybrid ranking: merge keyword and vector hits into one list.
//!
//! The merge is a pure function over [`BackendOutcome`]s. A backend that
//! is not configured, that failed, or that returned rows are all ordinary
//! inputs, so degraded search needs no special control flow.
//!
//! # Scoring
//!
//! 1. Join hits on file path. Each backend contributes the maximum score
//!    it produced for that path.
//! 2. When both backends produced hits,
//!    `hybrid = w_v × vector + w_k × keyword` (default 0.7 / 0.3).
//! 3. When only one backend produced hits, its score is the hybrid score
//!    and the other side is 0.
//! 4. Sort by hybrid score (desc), then path (asc); truncate to `limit`.

use std::collections::HashMap;

use crate::error::{BackendError, ConfigError};
use crate::models::{Backend, RankedResult, SearchHit};

/// Default weight of the vector score.
pub const DEFAULT_VECTOR_WEIGHT: f64 = 0.7;

/// Default weight of the keyword score.
pub const DEFAULT_KEYWORD_WEIGHT: f64 = 0.3;

/// What one backend contributed to a query.
#[derive(Debug, Clone)]
pub enum BackendOutcome {
    /// The backend is not configured.
    Absent,
    /// The backend was asked and failed.
    Failed(BackendError),
    /// The backend answered (possibly with zero rows).
    Hits(Vec<SearchHit>),
}

impl BackendOutcome {
    pub fn hits(&self) -> &[SearchHit] {
        match self {
            BackendOutcome::Hits(h) => h,
            _ => &[],
        }
    }

    /// True if the backend answered with at least one row.
    pub fn has_hits(&self) -> bool {
        !self.hits().is_empty()
    }

    /// Fold a backend call's result into an outcome.
    pub fn from_result(result: Result<Vec<SearchHit>, BackendError>) -> Self {
        match result {
            Ok(hits) => BackendOutcome::Hits(hits),
            Err(e) => BackendOutcome::Failed(e),
        }
    }
}

/// Weights for combining vector and keyword scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    vector: f64,
    keyword: f64,
}

impl HybridWeights {
    pub fn new(vector: f64, keyword: f64) -> Result<Self, ConfigError> {
        for (name, w) in [("vector_weight", vector), ("keyword_weight", keyword)] {
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::Invalid {
                    name,
                    reason: format!("must be a non-negative number, got {}", w),
                });
            }
        }
        if vector + keyword <= 0.0 {
            return Err(ConfigError::Invalid {
                name: "weights",
                reason: "vector_weight + keyword_weight must be > 0".to_string(),
            });
        }
        Ok(Self { vector, keyword })
    }

    pub fn vector(&self) -> f64 {
        self.vector
    }

    pub fn keyword(&self) -> f64 {
        self.keyword
    }
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            vector: DEFAULT_VECTOR_WEIGHT,
            keyword: DEFAULT_KEYWORD_WEIGHT,
        }
    }
}

/// Min-max normalize raw scores (higher is better) to `[0.0, 1.0]`.
///
/// If all scores are equal, they are normalized to `1.0`.
pub fn normalize_scores(raw: &[f64]) -> Vec<f64> {
    if raw.is_empty() {
        return Vec::new();
    }

    let s_min = raw.iter().copied().fold(f64::INFINITY, f64::min);
    let s_max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    raw.iter()
        .map(|s| {
            if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (s - s_min) / (s_max - s_min)
            }
        })
        .collect()
}

/// Convert a cosine distance to a similarity in `[0.0, 1.0]`.
pub fn similarity_from_distance(distance: f64) -> f64 {
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Merge both backends' outcomes into a ranked list.
pub fn merge_outcomes(
    vector: &BackendOutcome,
    keyword: &BackendOutcome,
    weights: &HybridWeights,
    limit: usize,
) -> Vec<RankedResult> {
    let (w_v, w_k) = match (vector.has_hits(), keyword.has_hits()) {
        (true, true) => (weights.vector(), weights.keyword()),
        (true, false) => (1.0, 0.0),
        (false, true) => (0.0, 1.0),
        (false, false) => return Vec::new(),
    };

    let mut merged: Vec<RankedResult> = Vec::new();
    let mut by_path: HashMap<String, usize> = HashMap::new();

    for hit in vector.hits().iter().chain(keyword.hits()) {
        let idx = *by_path.entry(hit.path.clone()).or_insert_with(|| {
            merged.push(RankedResult {
                path: hit.path.clone(),
                tier: hit.tier,
                snippet: hit.snippet.clone(),
                vector_score: 0.0,
                keyword_score: 0.0,
                hybrid_score: 0.0,
                sources: Vec::new(),
            });
            merged.len() - 1
        });
        let entry = &mut merged[idx];

        match hit.backend {
            Backend::Vector => entry.vector_score = entry.vector_score.max(hit.score),
            Backend::Keyword => entry.keyword_score = entry.keyword_score.max(hit.score),
        }
        if !entry.sources.contains(&hit.backend) {
            entry.sources.push(hit.backend);
        }
        if entry.snippet.is_empty() {
            entry.snippet = hit.snippet.clone();
        }
    }

    for r in &mut merged {
        r.hybrid_score = w_v * r.vector_score + w_k * r.keyword_score;
    }

    merged.sort_by(|a, b| {
        b.hybrid_score
            .partial_cmp(&a.hybrid_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tier;

    fn hit(path: &str, score: f64, backend: Backend) -> SearchHit {
        SearchHit {
            path: path.to_string(),
            tier: Tier::Project,
            snippet: format!("{} snippet", path),
            score,
            backend,
            chunk_index: match backend {
                Backend::Vector => Some(0),
                Backend::Keyword => None,
            },
        }
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize_scores(&[]).is_empty());
    }

    #[test]
    fn test_normalize_single() {
        assert_eq!(normalize_scores(&[-3.2]), vec![1.0]);
    }

    #[test]
    fn test_normalize_range() {
        let n = normalize_scores(&[10.0, 5.0, 0.0]);
        assert!((n[0] - 1.0).abs() < 1e-9);
        assert!((n[1] - 0.5).abs() < 1e-9);
        assert!(n[2].abs() < 1e-9);
    }

    #[test]
    fn test_normalize_all_equal() {
        for s in normalize_scores(&[3.0, 3.0]) {
            assert!((s - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_similarity_clamped() {
        assert_eq!(similarity_from_distance(0.0), 1.0);
        assert_eq!(similarity_from_distance(1.5), 0.0);
        assert!((similarity_from_distance(0.25) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_weights_validation() {
        assert!(HybridWeights::new(0.7, 0.3).is_ok());
        assert!(HybridWeights::new(-0.1, 0.3).is_err());
        assert!(HybridWeights::new(0.0, 0.0).is_err());
        assert!(HybridWeights::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_keyword_only_scores_pass_through() {
        let keyword = BackendOutcome::Hits(vec![
            hit("a.md", 1.0, Backend::Keyword),
            hit("b.md", 0.4, Backend::Keyword),
        ]);
        for vector in [
            BackendOutcome::Absent,
            BackendOutcome::Failed(BackendError::Timeout(5000)),
            BackendOutcome::Hits(Vec::new()),
        ] {
            let ranked = merge_outcomes(&vector, &keyword, &HybridWeights::default(), 8);
            assert_eq!(ranked.len(), 2);
            for r in &ranked {
                assert_eq!(r.vector_score, 0.0);
                assert_eq!(r.hybrid_score, r.keyword_score);
                assert_eq!(r.sources, vec![Backend::Keyword]);
            }
        }
    }

    #[test]
    fn test_vector_only_scores_pass_through() {
        let vector = BackendOutcome::Hits(vec![
            hit("a.md", 0.91, Backend::Vector),
            hit("b.md", 0.55, Backend::Vector),
        ]);
        let ranked = merge_outcomes(
            &vector,
            &BackendOutcome::Hits(Vec::new()),
            &HybridWeights::default(),
            8,
        );
        for r in &ranked {
            assert_eq!(r.keyword_score, 0.0);
            assert_eq!(r.hybrid_score, r.vector_score);
            assert_eq!(r.sources, vec![Backend::Vector]);
        }
    }

    #[test]
    fn test_max_score_per_backend_per_path() {
        let vector = BackendOutcome::Hits(vec![
            hit("a.md", 0.3, Backend::Vector),
            hit("a.md", 0.8, Backend::Vector),
            hit("a.md", 0.5, Backend::Vector),
        ]);
        let keyword = BackendOutcome::Hits(vec![hit("a.md", 0.6, Backend::Keyword)]);
        let ranked = merge_outcomes(&vector, &keyword, &HybridWeights::default(), 8);
        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].vector_score - 0.8).abs() < 1e-9);
        assert!((ranked[0].keyword_score - 0.6).abs() < 1e-9);
        assert!((ranked[0].hybrid_score - (0.7 * 0.8 + 0.3 * 0.6)).abs() < 1e-9);
        assert_eq!(ranked[0].sources, vec![Backend::Vector, Backend::Keyword]);
    }

    #[test]
    fn test_top_on_both_ranks_above_top_on_one() {
        let vector = BackendOutcome::Hits(vec![
            hit("both.md", 1.0, Backend::Vector),
            hit("vec.md", 1.0, Backend::Vector),
        ]);
        let keyword = BackendOutcome::Hits(vec![
            hit("both.md", 1.0, Backend::Keyword),
            hit("kw.md", 1.0, Backend::Keyword),
        ]);
        let ranked = merge_outcomes(&vector, &keyword, &HybridWeights::default(), 8);
        assert_eq!(ranked[0].path, "both.md");
        assert!(ranked[0].hybrid_score >= ranked[1].hybrid_score);
    }

    #[test]
    fn test_ties_broken_by_path() {
        let keyword = BackendOutcome::Hits(vec![
            hit("z.md", 1.0, Backend::Keyword),
            hit("a.md", 1.0, Backend::Keyword),
            hit("m.md", 1.0, Backend::Keyword),
        ]);
        let ranked = merge_outcomes(&BackendOutcome::Absent, &keyword, &HybridWeights::default(), 8);
        let paths: Vec<&str> = ranked.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["a.md", "m.md", "z.md"]);
    }

    #[test]
    fn test_truncates_to_limit() {
        let keyword = BackendOutcome::Hits(
            (0..10)
                .map(|i| hit(&format!("f{}.md", i), 1.0 - i as f64 / 10.0, Backend::Keyword))
                .collect(),
        );
        let ranked = merge_outcomes(&BackendOutcome::Absent, &keyword, &HybridWeights::default(), 3);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].path, "f0.md");
    }

    #[test]
    fn test_neither_backend_empty() {
        let ranked = merge_outcomes(
            &BackendOutcome::Absent,
            &BackendOutcome::Absent,
            &HybridWeights::default(),
            8,
        );
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_merge_commutes_over_input_order() {
        let v1 = vec![hit("a.md", 0.2, Backend::Vector), hit("b.md", 0.9, Backend::Vector)];
        let mut v2 = v1.clone();
        v2.reverse();
        let keyword = BackendOutcome::Hits(vec![hit("b.md", 1.0, Backend::Keyword)]);
        let r1 = merge_outcomes(&BackendOutcome::Hits(v1), &keyword, &HybridWeights::default(), 8);
        let r2 = merge_outcomes(&BackendOutcome::Hits(v2), &keyword, &HybridWeights::default(), 8);
        let s1: Vec<(String, f64)> = r1.iter().map(|r| (r.path.clone(), r.hybrid_score)).collect();
        let s2: Vec<(String, f64)> = r2.iter().map(|r| (r.path.clone(), r.hybrid_score)).collect();
        assert_eq!(s1, s2);
    }
}
