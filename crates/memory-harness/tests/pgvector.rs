//! Live PostgreSQL + pgvector tests.
//!
//! Skipped unless `MEM_TEST_DATABASE_URL` points at a database where the
//! `vector` extension can be created.

use async_trait::async_trait;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use memory_harness::backends::{Backends, VectorSide};
use memory_harness::indexer::Indexer;
use memory_harness::keyword::SqliteKeywordIndex;
use memory_harness::scanner::Scanner;
use memory_harness::search::{HybridSearcher, SearchMode};
use memory_harness::vector::pg::PgVectorIndex;
use memory_harness_core::chunk::ChunkParams;
use memory_harness_core::embedding::Embedder;
use memory_harness_core::error::BackendError;
use memory_harness_core::models::{Backend, Tier};
use memory_harness_core::rank::HybridWeights;
use memory_harness_core::store::VectorIndex;

const DIMS: usize = 8;

/// Bag-of-letters embedder so similar texts land close together.
struct LetterEmbedder;

#[async_trait]
impl Embedder for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.1f32; DIMS];
                for c in t.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
                    v[(c as usize - 'a' as usize) % DIMS] += 1.0;
                }
                v
            })
            .collect())
    }
}

fn database_url() -> Option<String> {
    std::env::var("MEM_TEST_DATABASE_URL")
        .ok()
        .filter(|u| !u.trim().is_empty())
}

#[tokio::test]
async fn test_postgres_hybrid_scenario() {
    let Some(url) = database_url() else {
        eprintln!("MEM_TEST_DATABASE_URL not set, skipping");
        return;
    };

    let tmp = TempDir::new().unwrap();
    let project = tmp.path().join("project");
    fs::create_dir_all(&project).unwrap();
    fs::write(
        project.join("decisions.md"),
        "We decided to use PostgreSQL with pgvector for semantic memory.",
    )
    .unwrap();
    fs::write(project.join("voice.md"), "Short sentences. No emoji.").unwrap();

    let table = format!("mem_test_{}", std::process::id());
    let index = Arc::new(
        PgVectorIndex::connect(&url, &table, DIMS, Duration::from_secs(5))
            .await
            .unwrap(),
    );
    let keyword = Arc::new(
        SqliteKeywordIndex::open(&tmp.path().join("kw.db"))
            .await
            .unwrap(),
    );
    let backends = Backends {
        keyword,
        vector: VectorSide::Ready {
            index: index.clone(),
            embedder: Arc::new(LetterEmbedder),
        },
    };

    let scanner = Scanner::new(vec![(Tier::Project, project.clone())]).unwrap();
    let indexer = Indexer::new(&scanner, ChunkParams::default(), 16);
    let first = indexer.run(&backends).await.unwrap().vector.unwrap();
    assert_eq!(first.files, 2);
    let second = indexer.run(&backends).await.unwrap().vector.unwrap();
    assert_eq!(second.skipped, 2);

    let searcher = HybridSearcher::new(
        backends.keyword.clone(),
        backends.vector.clone(),
        HybridWeights::default(),
    );

    let results = searcher.rank("PostgreSQL", 5, SearchMode::Keyword).await;
    assert!(results[0].path.ends_with("decisions.md"));

    let results = searcher.rank("PostgreSQL", 5, SearchMode::Hybrid).await;
    assert!(results[0].path.ends_with("decisions.md"));
    assert!(results[0].sources.contains(&Backend::Vector));

    assert!(searcher
        .rank("xyzzyplugh", 5, SearchMode::Keyword)
        .await
        .is_empty());

    let stats = index.stats().await.unwrap();
    assert_eq!(stats.files, 2);

    backends.close().await;
    let pool = sqlx::PgPool::connect(&url).await.unwrap();
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;
}
