//! Backend wiring for one `mem` invocation.
//!
//! The keyword index is always present. The vector side degrades: no URL
//! or no usable embedder means it is absent (keyword-only mode), and a
//! connection failure is kept as data so the searcher can still answer from
//! the keyword index.

use anyhow::Result;
use std::sync::Arc;

use memory_harness_core::embedding::Embedder;
use memory_harness_core::error::BackendError;
use memory_harness_core::store::{KeywordIndex, VectorIndex};

use crate::config::Config;
use crate::embedding::{create_embedder, EmbedPurpose};
use crate::keyword::SqliteKeywordIndex;
use crate::vector::open_vector_index;

/// State of the vector side after startup.
#[derive(Clone)]
pub enum VectorSide {
    /// Not configured, or no embedder available.
    Absent,
    /// Configured but could not be reached.
    Unreachable(BackendError),
    Ready {
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
    },
}

pub struct Backends {
    pub keyword: Arc<dyn KeywordIndex>,
    pub vector: VectorSide,
}

impl Backends {
    /// Open the keyword index and try the vector side.
    ///
    /// Only a keyword index that cannot be created even after self-heal is
    /// an error.
    pub async fn open(config: &Config, purpose: EmbedPurpose) -> Result<Self> {
        let keyword = SqliteKeywordIndex::open(&config.keyword_db_path()).await?;
        let vector = open_vector_side(config, purpose).await;
        Ok(Self {
            keyword: Arc::new(keyword),
            vector,
        })
    }

    pub async fn close(&self) {
        self.keyword.close().await;
        if let VectorSide::Ready { index, .. } = &self.vector {
            index.close().await;
        }
    }
}

/// Resolve the vector side from configuration.
pub async fn open_vector_side(config: &Config, purpose: EmbedPurpose) -> VectorSide {
    if config.vector.url.is_none() {
        tracing::debug!("no vector URL configured, keyword-only mode");
        return VectorSide::Absent;
    }

    let embedder = match create_embedder(&config.embedding, purpose) {
        Ok(Some(e)) => e,
        Ok(None) => {
            tracing::warn!("vector URL set but embedding provider is disabled, keyword-only mode");
            return VectorSide::Absent;
        }
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "embedder unavailable, keyword-only mode");
            return VectorSide::Absent;
        }
    };

    match open_vector_index(config).await {
        Ok(Some(index)) => VectorSide::Ready { index, embedder },
        Ok(None) => VectorSide::Absent,
        Err(e) => {
            let message = format!("{:#}", e);
            tracing::warn!(error = %message, "vector index unreachable, keyword-only mode");
            VectorSide::Unreachable(BackendError::Unavailable(message))
        }
    }
}
