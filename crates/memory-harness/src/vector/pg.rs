//! PostgreSQL + pgvector [`VectorIndex`].
//!
//! Embeddings live in a `vector(D)` column with an HNSW cosine index.
//! Vectors travel as text literals (`[0.1,0.2,…]`) cast with
//! `$n::text::vector`, so no pgvector client type is needed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;

use memory_harness_core::embedding::to_pgvector_literal;
use memory_harness_core::error::BackendError;
use memory_harness_core::models::{Backend, Chunk, SearchHit, Tier, TierCount};
use memory_harness_core::rank::similarity_from_distance;
use memory_harness_core::store::{check_pairing, snippet_of, VectorIndex, VectorStats};

use crate::db::backend_error;

pub struct PgVectorIndex {
    pool: PgPool,
    table: String,
    dims: usize,
}

impl PgVectorIndex {
    /// Connect, enable the `vector` extension and create the table and
    /// HNSW index if needed.
    pub async fn connect(
        url: &str,
        table: &str,
        dims: usize,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(connect_timeout)
            .connect(url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let index = Self {
            pool,
            table: table.to_string(),
            dims,
        };
        index.ensure_schema().await?;
        Ok(index)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .context("Failed to enable pgvector extension")?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {t} (
                id BIGSERIAL PRIMARY KEY,
                path TEXT NOT NULL,
                tier TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                chunk_text TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                embedding vector({d}),
                updated_at TIMESTAMP DEFAULT NOW(),
                UNIQUE(path, chunk_index)
            )
            "#,
            t = self.table,
            d = self.dims
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {t}_embedding_idx ON {t} USING hnsw (embedding vector_cosine_ops)",
            t = self.table
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    fn name(&self) -> &'static str {
        "pgvector"
    }

    async fn fingerprint_of(&self, path: &str) -> Result<Option<String>, BackendError> {
        sqlx::query_scalar(&format!(
            "SELECT content_hash FROM {} WHERE path = $1 AND chunk_index = 0 LIMIT 1",
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
        let mut tx = self.pool.begin().await.map_err(backend_error)?;

        sqlx::query(&format!("DELETE FROM {} WHERE path = $1", self.table))
            .bind(path)
            .execute(&mut *tx)
            .await
            .map_err(backend_error)?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(&format!(
                r#"
                INSERT INTO {} (path, tier, chunk_index, chunk_text, content_hash, embedding)
                VALUES ($1, $2, $3, $4, $5, $6::text::vector)
                ON CONFLICT (path, chunk_index) DO UPDATE SET
                    chunk_text = EXCLUDED.chunk_text,
                    content_hash = EXCLUDED.content_hash,
                    embedding = EXCLUDED.embedding,
                    updated_at = NOW()
                "#,
                self.table
            ))
            .bind(path)
            .bind(chunk.tier.as_str())
            .bind(chunk.chunk_index as i32)
            .bind(&chunk.text)
            .bind(&chunk.fingerprint)
            .bind(to_pgvector_literal(vector))
            .execute(&mut *tx)
            .await
            .map_err(backend_error)?;
        }

        tx.commit().await.map_err(backend_error)?;
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), BackendError> {
        sqlx::query(&format!("DELETE FROM {} WHERE path = $1", self.table))
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
        let literal = to_pgvector_literal(vector);
        let rows = sqlx::query(&format!(
            r#"
            SELECT path, tier, chunk_index, chunk_text,
                   (embedding <=> $1::text::vector)::float8 AS distance
            FROM {}
            WHERE embedding IS NOT NULL
            ORDER BY embedding <=> $1::text::vector
            LIMIT $2
            "#,
            self.table
        ))
        .bind(&literal)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let path: String = row.try_get("path").map_err(backend_error)?;
            let tier: String = row.try_get("tier").map_err(backend_error)?;
            let Ok(tier) = tier.parse::<Tier>() else {
                tracing::debug!(path = %path, tier = %tier, "skipping vector row with unknown tier");
                continue;
            };
            let chunk_index: i32 = row.try_get("chunk_index").map_err(backend_error)?;
            let text: String = row.try_get("chunk_text").map_err(backend_error)?;
            let distance: f64 = row.try_get("distance").map_err(backend_error)?;

            hits.push(SearchHit {
                path,
                tier,
                snippet: snippet_of(&text),
                score: similarity_from_distance(distance),
                backend: Backend::Vector,
                chunk_index: Some(chunk_index as i64),
            });
        }
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
