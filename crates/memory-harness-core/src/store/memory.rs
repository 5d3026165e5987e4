//! In-memory [`KeywordIndex`] and [`VectorIndex`] implementations.
//!
//! Used by tests and as a stand-in when no persistent backend is wanted.
//! Keyword search counts matching query terms per file; vector search is
//! brute-force cosine similarity over every stored vector.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::BackendError;
use crate::models::{Backend, Chunk, KnowledgeFile, SearchHit, Tier, TierCount};
use crate::rank::{normalize_scores, similarity_from_distance};

use super::{
    check_pairing, snippet_of, KeywordIndex, KeywordStats, VectorIndex, VectorStats,
};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, BackendError> {
    lock.read()
        .map_err(|_| BackendError::Unavailable("in-memory index lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, BackendError> {
    lock.write()
        .map_err(|_| BackendError::Unavailable("in-memory index lock poisoned".to_string()))
}

fn tier_counts(rows: impl Iterator<Item = (Tier, String)>) -> Vec<TierCount> {
    let mut by_tier: BTreeMap<Tier, (BTreeSet<String>, i64)> = BTreeMap::new();
    for (tier, path) in rows {
        let entry = by_tier.entry(tier).or_default();
        entry.0.insert(path);
        entry.1 += 1;
    }
    by_tier
        .into_iter()
        .map(|(tier, (paths, chunks))| TierCount {
            tier: tier.to_string(),
            files: paths.len() as i64,
            chunks,
        })
        .collect()
}

struct StoredFile {
    path: String,
    tier: Tier,
    text: String,
}

/// Term-matching keyword index.
#[derive(Default)]
pub struct InMemoryKeywordIndex {
    files: RwLock<Vec<StoredFile>>,
}

impl InMemoryKeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeywordIndex for InMemoryKeywordIndex {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn reindex(&self, files: &[KnowledgeFile]) -> Result<usize, BackendError> {
        let rows: Vec<StoredFile> = files
            .iter()
            .map(|f| StoredFile {
                path: f.key(),
                tier: f.tier,
                text: f.text.clone(),
            })
            .collect();
        let count = rows.len();
        *write(&self.files)? = rows;
        Ok(count)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, BackendError> {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let files = read(&self.files)?;
        let mut matched: Vec<(&StoredFile, f64)> = files
            .iter()
            .filter_map(|f| {
                let text_lower = f.text.to_lowercase();
                let matches = terms.iter().filter(|t| text_lower.contains(*t)).count();
                (matches > 0).then_some((f, matches as f64))
            })
            .collect();
        matched.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.path.cmp(&b.0.path))
        });
        matched.truncate(limit);

        let raw: Vec<f64> = matched.iter().map(|(_, s)| *s).collect();
        let scores = normalize_scores(&raw);

        Ok(matched
            .into_iter()
            .zip(scores)
            .map(|((f, _), score)| SearchHit {
                path: f.path.clone(),
                tier: f.tier,
                snippet: snippet_of(&f.text),
                score,
                backend: Backend::Keyword,
                chunk_index: None,
            })
            .collect())
    }

    async fn stats(&self) -> Result<KeywordStats, BackendError> {
        let files = read(&self.files)?;
        Ok(KeywordStats {
            files: files.len() as i64,
            by_tier: tier_counts(files.iter().map(|f| (f.tier, f.path.clone()))),
        })
    }
}

struct StoredVector {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Brute-force cosine vector index.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    rows: RwLock<Vec<StoredVector>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fingerprint_of(&self, path: &str) -> Result<Option<String>, BackendError> {
        let rows = read(&self.rows)?;
        Ok(rows
            .iter()
            .find(|r| r.chunk.path == path && r.chunk.chunk_index == 0)
            .map(|r| r.chunk.fingerprint.clone()))
    }

    async fn replace_file(
        &self,
        path: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), BackendError> {
        check_pairing(chunks, vectors)?;
        let mut rows = write(&self.rows)?;
        rows.retain(|r| r.chunk.path != path);
        for (c, v) in chunks.iter().zip(vectors) {
            rows.push(StoredVector {
                chunk: c.clone(),
                vector: v.clone(),
            });
        }
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), BackendError> {
        write(&self.rows)?.retain(|r| r.chunk.path != path);
        Ok(())
    }

    async fn indexed_paths(&self) -> Result<Vec<String>, BackendError> {
        let rows = read(&self.rows)?;
        let paths: BTreeSet<String> = rows.iter().map(|r| r.chunk.path.clone()).collect();
        Ok(paths.into_iter().collect())
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>, BackendError> {
        let rows = read(&self.rows)?;
        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(|r| {
                let distance = 1.0 - cosine_similarity(vector, &r.vector) as f64;
                SearchHit {
                    path: r.chunk.path.clone(),
                    tier: r.chunk.tier,
                    snippet: snippet_of(&r.chunk.text),
                    score: similarity_from_distance(distance),
                    backend: Backend::Vector,
                    chunk_index: Some(r.chunk.chunk_index),
                }
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn stats(&self) -> Result<VectorStats, BackendError> {
        let rows = read(&self.rows)?;
        let paths: BTreeSet<&str> = rows.iter().map(|r| r.chunk.path.as_str()).collect();
        Ok(VectorStats {
            files: paths.len() as i64,
            chunks: rows.len() as i64,
            by_tier: tier_counts(rows.iter().map(|r| (r.chunk.tier, r.chunk.path.clone()))),
        })
    }
}
