//! SQLite FTS5 keyword index.
//!
//! One row per knowledge file in the `memory_fts` virtual table, tokenized
//! with `porter unicode61` so "decided" matches "decide". Ranking uses the
//! FTS5 `rank` column (BM25, lower is better), rescaled per query so the
//! best row scores 1.0.
//!
//! The index is a disposable cache of the memory directories: if the file
//! cannot be opened or its schema created, it is deleted and rebuilt once.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};

use memory_harness_core::error::BackendError;
use memory_harness_core::models::{Backend, KnowledgeFile, SearchHit, Tier, TierCount};
use memory_harness_core::rank::normalize_scores;
use memory_harness_core::store::{KeywordIndex, KeywordStats};

use crate::db::{self, backend_error};

const SEARCH_SQL: &str = "SELECT tier, path, snippet(memory_fts, 2, '', '', '...', 32) AS snippet, rank \
     FROM memory_fts WHERE memory_fts MATCH ? ORDER BY rank LIMIT ?";

pub struct SqliteKeywordIndex {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteKeywordIndex {
    /// Open (or create) the index at `path`.
    ///
    /// A file that fails to open or to take the schema is removed and
    /// recreated once; a second failure is returned.
    pub async fn open(path: &Path) -> Result<Self> {
        match Self::try_open(path).await {
            Ok(pool) => Ok(Self {
                pool,
                path: path.to_path_buf(),
            }),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "keyword index unusable, recreating"
                );
                db::remove_db_files(path).with_context(|| {
                    format!("Failed to remove keyword index: {}", path.display())
                })?;
                let pool = Self::try_open(path).await.with_context(|| {
                    format!("Failed to recreate keyword index: {}", path.display())
                })?;
                Ok(Self {
                    pool,
                    path: path.to_path_buf(),
                })
            }
        }
    }

    async fn try_open(path: &Path) -> Result<SqlitePool> {
        let pool = db::connect(path).await?;
        if let Err(e) = ensure_schema(&pool).await {
            pool.close().await;
            return Err(e);
        }
        Ok(pool)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run_match(&self, query: &str, limit: usize) -> Result<Vec<RawRow>, sqlx::Error> {
        let rows = sqlx::query(SEARCH_SQL)
            .bind(query)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<RawRow, sqlx::Error> {
                Ok(RawRow {
                    tier: row.try_get("tier")?,
                    path: row.try_get("path")?,
                    snippet: row.try_get("snippet")?,
                    rank: row.try_get("rank")?,
                })
            })
            .collect()
    }
}

struct RawRow {
    tier: String,
    path: String,
    snippet: String,
    rank: f64,
}

async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='memory_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            "CREATE VIRTUAL TABLE memory_fts USING fts5(tier, path, content, tokenize='porter unicode61')",
        )
        .execute(pool)
        .await?;
    }

    // A corrupt file fails here.
    let _: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memory_fts")
        .fetch_one(pool)
        .await?;

    Ok(())
}

/// Quote `query` as a single FTS5 phrase.
fn phrase_query(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\"\""))
}

#[async_trait]
impl KeywordIndex for SqliteKeywordIndex {
    fn name(&self) -> &'static str {
        "sqlite-fts5"
    }

    async fn reindex(&self, files: &[KnowledgeFile]) -> Result<usize, BackendError> {
        let mut tx = self.pool.begin().await.map_err(backend_error)?;

        sqlx::query("DELETE FROM memory_fts")
            .execute(&mut *tx)
            .await
            .map_err(backend_error)?;

        for file in files {
            sqlx::query("INSERT INTO memory_fts(tier, path, content) VALUES (?, ?, ?)")
                .bind(file.tier.as_str())
                .bind(file.key())
                .bind(&file.text)
                .execute(&mut *tx)
                .await
                .map_err(backend_error)?;
        }

        tx.commit().await.map_err(backend_error)?;
        tracing::debug!(files = files.len(), "keyword index rebuilt");
        Ok(files.len())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, BackendError> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let rows = match self.run_match(query, limit).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::debug!(error = %e, "FTS5 query rejected, retrying as phrase");
                self.run_match(&phrase_query(query), limit)
                    .await
                    .map_err(backend_error)?
            }
        };

        let rows: Vec<(Tier, RawRow)> = rows
            .into_iter()
            .filter_map(|r| match r.tier.parse::<Tier>() {
                Ok(tier) => Some((tier, r)),
                Err(e) => {
                    tracing::debug!(path = %r.path, error = %e, "skipping keyword row");
                    None
                }
            })
            .collect();

        // rank is lower-is-better; negate so normalization puts the best at 1.0
        let raw: Vec<f64> = rows.iter().map(|(_, r)| -r.rank).collect();
        let scores = normalize_scores(&raw);

        Ok(rows
            .into_iter()
            .zip(scores)
            .map(|((tier, r), score)| SearchHit {
                path: r.path,
                tier,
                snippet: r.snippet,
                score,
                backend: Backend::Keyword,
                chunk_index: None,
            })
            .collect())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    async fn stats(&self) -> Result<KeywordStats, BackendError> {
        let rows = sqlx::query(
            "SELECT tier, COUNT(*) AS files FROM memory_fts GROUP BY tier ORDER BY tier",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        let mut stats = KeywordStats::default();
        for row in &rows {
            let files: i64 = row.try_get("files").map_err(backend_error)?;
            stats.files += files;
            stats.by_tier.push(TierCount {
                tier: row.try_get("tier").map_err(backend_error)?,
                files,
                chunks: files,
            });
        }
        Ok(stats)
    }
}
