//! Hybrid search over the keyword and vector indexes.
//!
//! Both backends are queried concurrently for `overfetch × limit` rows.
//! Whatever each side produces (hits, a failure, or nothing because it is
//! not configured) becomes a [`BackendOutcome`] and goes through the pure
//! merge in the core crate. Backend failures are logged and never returned
//! from [`HybridSearcher::rank`].
//!
//! `mem search` rebuilds the keyword index from disk before querying, so
//! results never lag behind edits and no prior `mem index` is needed.
//!
//! # Modes
//!
//! | Mode | Backends |
//! |------|----------|
//! | `hybrid` | keyword + vector, weighted (default) |
//! | `keyword` | keyword only |
//! | `vector` | vector only; empty when unavailable |

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use memory_harness_core::error::BackendError;
use memory_harness_core::models::{KnowledgeFile, RankedResult};
use memory_harness_core::rank::{merge_outcomes, BackendOutcome, HybridWeights};
use memory_harness_core::store::KeywordIndex;

use crate::backends::{Backends, VectorSide};
use crate::config::Config;
use crate::scanner::Scanner;

const DEFAULT_OVERFETCH: usize = 2;
const DEFAULT_VECTOR_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Hybrid,
    Keyword,
    Vector,
}

pub struct HybridSearcher {
    keyword: Arc<dyn KeywordIndex>,
    vector: VectorSide,
    weights: HybridWeights,
    overfetch: usize,
    vector_timeout: Duration,
}

impl HybridSearcher {
    pub fn new(keyword: Arc<dyn KeywordIndex>, vector: VectorSide, weights: HybridWeights) -> Self {
        Self {
            keyword,
            vector,
            weights,
            overfetch: DEFAULT_OVERFETCH,
            vector_timeout: DEFAULT_VECTOR_TIMEOUT,
        }
    }

    /// Searcher over opened backends with retrieval settings from `config`.
    pub fn from_config(backends: &Backends, config: &Config) -> Result<Self> {
        Ok(
            Self::new(backends.keyword.clone(), backends.vector.clone(), config.weights()?)
                .with_overfetch(config.retrieval.overfetch)
                .with_vector_timeout(Duration::from_millis(config.retrieval.vector_timeout_ms)),
        )
    }

    pub fn with_overfetch(mut self, overfetch: usize) -> Self {
        self.overfetch = overfetch.max(1);
        self
    }

    /// Bound on embedding the query plus the vector query itself.
    pub fn with_vector_timeout(mut self, timeout: Duration) -> Self {
        self.vector_timeout = timeout;
        self
    }

    /// Ranked results for `query`, best first, at most `limit`.
    pub async fn rank(&self, query: &str, limit: usize, mode: SearchMode) -> Vec<RankedResult> {
        if query.trim().is_empty() || limit == 0 {
            return Vec::new();
        }
        let fetch = limit.saturating_mul(self.overfetch);

        let (vector, keyword) = tokio::join!(
            async {
                match mode {
                    SearchMode::Keyword => BackendOutcome::Absent,
                    _ => self.vector_outcome(query, fetch, mode).await,
                }
            },
            async {
                match mode {
                    SearchMode::Vector => BackendOutcome::Absent,
                    _ => self.keyword_outcome(query, fetch).await,
                }
            },
        );

        let results = merge_outcomes(&vector, &keyword, &self.weights, limit);
        tracing::debug!(
            query = %query,
            results = results.len(),
            vector_hits = vector.hits().len(),
            keyword_hits = keyword.hits().len(),
            "search complete"
        );
        results
    }

    async fn keyword_outcome(&self, query: &str, fetch: usize) -> BackendOutcome {
        let result = self.keyword.search(query, fetch).await;
        if let Err(e) = &result {
            tracing::warn!(backend = self.keyword.name(), error = %e, "keyword search failed");
        }
        BackendOutcome::from_result(result)
    }

    async fn vector_outcome(&self, query: &str, fetch: usize, mode: SearchMode) -> BackendOutcome {
        let (index, embedder) = match &self.vector {
            VectorSide::Ready { index, embedder } => (index, embedder),
            VectorSide::Unreachable(e) => {
                if mode == SearchMode::Vector {
                    tracing::warn!(error = %e, "vector search unavailable");
                }
                return BackendOutcome::Failed(e.clone());
            }
            VectorSide::Absent => {
                if mode == SearchMode::Vector {
                    tracing::warn!("vector search requested but no vector index is configured");
                }
                return BackendOutcome::Absent;
            }
        };

        let call = async {
            let vector = embedder.embed_one(query).await?;
            index.query(&vector, fetch).await
        };
        let result = match tokio::time::timeout(self.vector_timeout, call).await {
            Ok(r) => r,
            Err(_) => Err(BackendError::Timeout(self.vector_timeout.as_millis() as u64)),
        };
        if let Err(e) = &result {
            tracing::warn!(backend = index.name(), error = %e, "vector search failed, using keyword results");
        }
        BackendOutcome::from_result(result)
    }
}

/// Text rendering of search results.
pub fn format_results(query: &str, results: &[RankedResult]) -> String {
    if results.is_empty() {
        return format!("No results for: {}\n", query);
    }

    let mut out = String::new();
    for r in results {
        let sources = r
            .sources
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join("+");
        out.push_str(&format!(
            "### [{}] {}  (hybrid: {:.3}  [{}])\n",
            r.tier, r.path, r.hybrid_score, sources
        ));
        if r.vector_score > 0.0 {
            out.push_str(&format!(
                "    vector={:.3}  keyword={:.3}\n",
                r.vector_score, r.keyword_score
            ));
        }
        out.push_str(&r.snippet);
        out.push_str("\n\n");
    }
    out
}

/// Rebuild `keyword` from a fresh scan.
///
/// On failure the previous index contents stay searchable and `None` is
/// returned.
pub async fn refresh_keyword_index(keyword: &dyn KeywordIndex, scanner: &Scanner) -> Option<usize> {
    let files: Vec<KnowledgeFile> = scanner.files().collect();
    match keyword.reindex(&files).await {
        Ok(count) => {
            tracing::debug!(files = count, backend = keyword.name(), "keyword index refreshed");
            Some(count)
        }
        Err(e) => {
            tracing::warn!(error = %e, "keyword refresh failed, searching existing index");
            None
        }
    }
}

/// Run `mem search`.
pub async fn run_search(
    config: &Config,
    backends: &Backends,
    scanner: &Scanner,
    query: &str,
    limit: Option<usize>,
    mode: SearchMode,
    json: bool,
) -> Result<()> {
    if mode != SearchMode::Vector {
        refresh_keyword_index(backends.keyword.as_ref(), scanner).await;
    }
    let searcher = HybridSearcher::from_config(backends, config)?;
    let limit = limit.unwrap_or(config.retrieval.limit);
    let results = searcher.rank(query, limit, mode).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print!("{}", format_results(query, &results));
    }
    Ok(())
}
