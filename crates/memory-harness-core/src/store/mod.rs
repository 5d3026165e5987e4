//! Storage abstraction for Memory Harness.
//!
//! Two index traits back the search layer:
//!
//! | Trait | Holds | Queried by |
//! |-------|-------|------------|
//! | [`KeywordIndex`] | one full-text row per knowledge file | raw query text |
//! | [`VectorIndex`] | one embedding per chunk, keyed by (path, ordinal) | query vector |
//!
//! Implementations must be `Send + Sync` to work with async runtimes. All
//! methods return [`BackendError`] so the query path can degrade instead of
//! failing.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::BackendError;
use crate::models::{Chunk, KnowledgeFile, SearchHit, TierCount};

/// Maximum snippet length (characters) for hits that carry raw chunk text.
pub const SNIPPET_CHARS: usize = 200;

/// Counts reported by a keyword index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KeywordStats {
    pub files: i64,
    pub by_tier: Vec<TierCount>,
}

/// Counts reported by a vector index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VectorStats {
    pub files: i64,
    pub chunks: i64,
    pub by_tier: Vec<TierCount>,
}

/// Ranked full-text search over whole knowledge files.
#[async_trait]
pub trait KeywordIndex: Send + Sync {
    /// Short backend name for status output.
    fn name(&self) -> &'static str;

    /// Replace the whole index with `files`. Returns the number of rows
    /// written. Readers see either the old or the new contents.
    async fn reindex(&self, files: &[KnowledgeFile]) -> Result<usize, BackendError>;

    /// Best-first hits with scores in `[0.0, 1.0]`. Whitespace-only
    /// queries return no hits.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, BackendError>;

    async fn stats(&self) -> Result<KeywordStats, BackendError>;

    /// Release connections. Called once at the end of a command.
    async fn close(&self) {}
}

/// Nearest-neighbour search over chunk embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Short backend name for status output.
    fn name(&self) -> &'static str;

    /// Fingerprint stored with chunk 0 of `path`, if the file is indexed.
    async fn fingerprint_of(&self, path: &str) -> Result<Option<String>, BackendError>;

    /// Delete every chunk of `path`, then store `chunks` with their
    /// `vectors` (same length, same order). Atomic per file.
    async fn replace_file(
        &self,
        path: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), BackendError>;

    /// Delete every chunk of `path`.
    async fn remove_file(&self, path: &str) -> Result<(), BackendError>;

    /// Distinct paths currently indexed, sorted.
    async fn indexed_paths(&self) -> Result<Vec<String>, BackendError>;

    /// Best-first hits by cosine similarity, scores in `[0.0, 1.0]`.
    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>, BackendError>;

    async fn stats(&self) -> Result<VectorStats, BackendError>;

    /// Release connections. Called once at the end of a command.
    async fn close(&self) {}
}

/// Reject a chunk/vector pairing whose lengths differ.
pub fn check_pairing(chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<(), BackendError> {
    if chunks.len() != vectors.len() {
        return Err(BackendError::Malformed(format!(
            "{} chunks but {} vectors",
            chunks.len(),
            vectors.len()
        )));
    }
    Ok(())
}

/// First `SNIPPET_CHARS` characters of `text`.
pub fn snippet_of(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}
