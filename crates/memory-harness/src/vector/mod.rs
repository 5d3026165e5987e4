//! Vector index backends.
//!
//! The backend is chosen by the scheme of `[vector] url`:
//!
//! | URL | Backend |
//! |-----|---------|
//! | `postgres://…`, `postgresql://…` | [`pg::PgVectorIndex`] (pgvector, HNSW) |
//! | `sqlite:…` | [`sqlite::SqliteVectorIndex`] (BLOBs, in-process cosine) |
//! | unset | none; retrieval is keyword-only |

pub mod pg;
pub mod sqlite;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use memory_harness_core::store::VectorIndex;

use crate::config::{redact_url, Config};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackendKind {
    Postgres,
    Sqlite,
}

impl VectorBackendKind {
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else if url.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else {
            None
        }
    }
}

/// Connect to the configured vector index and ensure its schema.
///
/// Returns `Ok(None)` when no URL is configured.
pub async fn open_vector_index(config: &Config) -> Result<Option<Arc<dyn VectorIndex>>> {
    let Some(url) = config.vector.url.as_deref() else {
        return Ok(None);
    };
    let table = &config.vector.table;

    let index: Arc<dyn VectorIndex> = match VectorBackendKind::from_url(url) {
        Some(VectorBackendKind::Postgres) => {
            let dims = config.embedding.resolved_dims().unwrap_or(0);
            let timeout = Duration::from_secs(config.vector.connect_timeout_secs);
            Arc::new(connect_pg(url, table, dims, timeout).await?)
        }
        Some(VectorBackendKind::Sqlite) => Arc::new(
            sqlite::SqliteVectorIndex::connect(url, table)
                .await
                .with_context(|| format!("Failed to open vector index: {}", redact_url(url)))?,
        ),
        None => anyhow::bail!("Unsupported vector URL: {}", redact_url(url)),
    };

    tracing::debug!(backend = index.name(), url = %redact_url(url), "vector index ready");
    Ok(Some(index))
}

async fn connect_pg(
    url: &str,
    table: &str,
    dims: usize,
    timeout: Duration,
) -> Result<pg::PgVectorIndex> {
    // acquire_timeout does not bound the TCP connect itself.
    match tokio::time::timeout(timeout, pg::PgVectorIndex::connect(url, table, dims, timeout)).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!(
            "Timed out after {}s connecting to {}",
            timeout.as_secs(),
            redact_url(url)
        ),
    }
}
