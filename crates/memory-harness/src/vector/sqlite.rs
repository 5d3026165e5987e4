//! SQLite-backed [`VectorIndex`].
//!
//! Embeddings are stored as little-endian f32 BLOBs next to their chunk
//! text. Queries load every row and rank by cosine similarity in process,
//! which is fast enough for a memory corpus of a few thousand chunks.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use memory_harness_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use memory_harness_core::error::BackendError;
use memory_harness_core::models::{Backend, Chunk, SearchHit, Tier, TierCount};
use memory_harness_core::rank::similarity_from_distance;
use memory_harness_core::store::{check_pairing, snippet_of, VectorIndex, VectorStats};

use crate::db::{self, backend_error};

pub struct SqliteVectorIndex {
    pool: SqlitePool,
    table: String,
}

impl SqliteVectorIndex {
    /// Connect to a `sqlite:` URL and create the table if needed.
    pub async fn connect(url: &str, table: &str) -> Result<Self> {
        let pool = db::connect_url(url).await?;
        let index = Self {
            pool,
            table: table.to_string(),
        };
        index.ensure_schema().await?;
        Ok(index)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {t} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                tier TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                chunk_text TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                embedding BLOB NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(path, chunk_index)
            )
            "#,
            t = self.table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{t}_path ON {t}(path)",
            t = self.table
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn fingerprint_of(&self, path: &str) -> Result<Option<String>, BackendError> {
        sqlx::query_scalar(&format!(
            "SELECT content_hash FROM {} WHERE path = ? AND chunk_index = 0 LIMIT 1",
            self.table
        ))
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)
    }

    async fn replace_file(
        &self,
        path: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), BackendError> {
        check_pairing(chunks, vectors)?;
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(backend_error)?;

        sqlx::query(&format!("DELETE FROM {} WHERE path = ?", self.table))
            .bind(path)
            .execute(&mut *tx)
            .await
            .map_err(backend_error)?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(&format!(
                r#"
                INSERT INTO {} (path, tier, chunk_index, chunk_text, content_hash, embedding, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(path, chunk_index) DO UPDATE SET
                    chunk_text = excluded.chunk_text,
                    content_hash = excluded.content_hash,
                    embedding = excluded.embedding,
                    updated_at = excluded.updated_at
                "#,
                self.table
            ))
            .bind(path)
            .bind(chunk.tier.as_str())
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.fingerprint)
            .bind(vec_to_blob(vector))
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(backend_error)?;
        }

        tx.commit().await.map_err(backend_error)?;
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), BackendError> {
        sqlx::query(&format!("DELETE FROM {} WHERE path = ?", self.table))
            .bind(path)
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn indexed_paths(&self) -> Result<Vec<String>, BackendError> {
        sqlx::query_scalar(&format!(
            "SELECT DISTINCT path FROM {} ORDER BY path",
            self.table
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>, BackendError> {
        let rows = sqlx::query(&format!(
            "SELECT path, tier, chunk_index, chunk_text, embedding FROM {}",
            self.table
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let path: String = row.try_get("path").map_err(backend_error)?;
            let tier: String = row.try_get("tier").map_err(backend_error)?;
            let blob: Vec<u8> = row.try_get("embedding").map_err(backend_error)?;

            let (Ok(tier), Some(stored)) = (tier.parse::<Tier>(), blob_to_vec(&blob)) else {
                tracing::debug!(path = %path, "skipping unreadable vector row");
                continue;
            };
            if stored.len() != vector.len() {
                tracing::debug!(path = %path, dims = stored.len(), "skipping vector row with wrong dims");
                continue;
            }

            let text: String = row.try_get("chunk_text").map_err(backend_error)?;
            let distance = 1.0 - cosine_similarity(vector, &stored) as f64;
            hits.push(SearchHit {
                path,
                tier,
                snippet: snippet_of(&text),
                score: similarity_from_distance(distance),
                backend: Backend::Vector,
                chunk_index: Some(row.try_get("chunk_index").map_err(backend_error)?),
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.path.cmp(&b.path))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    async fn stats(&self) -> Result<VectorStats, BackendError> {
        let rows = sqlx::query(&format!(
            "SELECT tier, COUNT(DISTINCT path) AS files, COUNT(*) AS chunks FROM {} GROUP BY tier ORDER BY tier",
            self.table
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        let mut stats = VectorStats::default();
        for row in &rows {
            let count = TierCount {
                tier: row.try_get("tier").map_err(backend_error)?,
                files: row.try_get("files").map_err(backend_error)?,
                chunks: row.try_get("chunks").map_err(backend_error)?,
            };
            stats.files += count.files;
            stats.chunks += count.chunks;
            stats.by_tier.push(count);
        }
        Ok(stats)
    }
}
