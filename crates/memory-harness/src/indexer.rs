//! Index maintenance.
//!
//! Rebuilds the keyword index from a fresh scan, then brings the vector
//! index up to date file by file: unchanged fingerprints are skipped,
//! changed files are re-chunked, embedded in batches and replaced, and
//! paths no longer on disk are removed. A failure on one file is counted
//! and logged; the run continues with the next file.

use anyhow::{Context, Result};
use std::collections::HashSet;

use memory_harness_core::chunk::{chunk_file, ChunkParams};
use memory_harness_core::embedding::Embedder;
use memory_harness_core::error::BackendError;
use memory_harness_core::models::{IndexReport, KnowledgeFile};
use memory_harness_core::store::{KeywordIndex, VectorIndex};

use crate::backends::{Backends, VectorSide};
use crate::config::Config;
use crate::scanner::Scanner;

/// Result of one [`Indexer::run`] pass.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IndexSummary {
    /// Files written to the keyword index.
    pub keyword_files: usize,
    /// Vector side counts; `None` when no vector index is usable.
    pub vector: Option<IndexReport>,
}

pub struct Indexer<'a> {
    scanner: &'a Scanner,
    params: ChunkParams,
    batch_size: usize,
}

impl<'a> Indexer<'a> {
    pub fn new(scanner: &'a Scanner, params: ChunkParams, batch_size: usize) -> Self {
        Self {
            scanner,
            params,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn run(&self, backends: &Backends) -> Result<IndexSummary> {
        let files: Vec<KnowledgeFile> = self.scanner.files().collect();
        tracing::info!(files = files.len(), "scanned memory roots");

        let keyword_files = self.rebuild_keyword(backends.keyword.as_ref(), &files).await?;

        let vector = match &backends.vector {
            VectorSide::Ready { index, embedder } => {
                Some(self.sync_vectors(index.as_ref(), embedder.as_ref(), &files).await?)
            }
            VectorSide::Unreachable(e) => {
                tracing::warn!(error = %e, "skipping vector indexing");
                None
            }
            VectorSide::Absent => None,
        };

        Ok(IndexSummary {
            keyword_files,
            vector,
        })
    }

    pub async fn rebuild_keyword(
        &self,
        keyword: &dyn KeywordIndex,
        files: &[KnowledgeFile],
    ) -> Result<usize> {
        let count = keyword
            .reindex(files)
            .await
            .with_context(|| format!("Failed to rebuild keyword index ({})", keyword.name()))?;
        tracing::info!(files = count, backend = keyword.name(), "keyword index rebuilt");
        Ok(count)
    }

    /// Bring the vector index in line with `files`.
    ///
    /// Only listing indexed paths is fatal; everything per file is counted.
    pub async fn sync_vectors(
        &self,
        index: &dyn VectorIndex,
        embedder: &dyn Embedder,
        files: &[KnowledgeFile],
    ) -> Result<IndexReport> {
        let mut report = IndexReport::default();
        let mut on_disk: HashSet<String> = HashSet::with_capacity(files.len());

        for file in files {
            let key = file.key();
            on_disk.insert(key.clone());

            match self.sync_file(index, embedder, file, &key).await {
                Ok(FileOutcome::Unchanged) => report.skipped += 1,
                Ok(FileOutcome::Written(chunks)) => {
                    report.files += 1;
                    report.chunks += chunks;
                }
                Ok(FileOutcome::Emptied) => {}
                Err(e) => {
                    tracing::warn!(path = %key, error = %e, "failed to index file");
                    report.errors += 1;
                }
            }
        }

        let indexed = index
            .indexed_paths()
            .await
            .context("Failed to list indexed paths")?;
        for path in indexed.iter().filter(|p| !on_disk.contains(*p)) {
            match index.remove_file(path).await {
                Ok(()) => {
                    tracing::debug!(path = %path, "removed deleted file from vector index");
                    report.removed += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "failed to remove stale file");
                    report.errors += 1;
                }
            }
        }

        tracing::info!(
            files = report.files,
            chunks = report.chunks,
            skipped = report.skipped,
            removed = report.removed,
            errors = report.errors,
            backend = index.name(),
            "vector index updated"
        );
        Ok(report)
    }

    async fn sync_file(
        &self,
        index: &dyn VectorIndex,
        embedder: &dyn Embedder,
        file: &KnowledgeFile,
        key: &str,
    ) -> Result<FileOutcome, BackendError> {
        if index.fingerprint_of(key).await?.as_deref() == Some(file.fingerprint.as_str()) {
            return Ok(FileOutcome::Unchanged);
        }

        let chunks = chunk_file(file, &self.params);
        if chunks.is_empty() {
            index.remove_file(key).await?;
            return Ok(FileOutcome::Emptied);
        }

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            vectors.extend(embedder.embed_batch(&texts).await?);
        }

        index.replace_file(key, &chunks, &vectors).await?;
        tracing::debug!(path = %key, chunks = chunks.len(), "indexed file");
        Ok(FileOutcome::Written(chunks.len()))
    }
}

enum FileOutcome {
    Unchanged,
    Written(usize),
    Emptied,
}

/// Run `mem index`.
pub async fn run_index(
    config: &Config,
    backends: &Backends,
    scanner: &Scanner,
    json: bool,
) -> Result<()> {
    let indexer = Indexer::new(scanner, config.chunk_params()?, config.embedding.batch_size);
    let summary = indexer.run(backends).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("mem index");
    println!("  keyword: {} files", summary.keyword_files);
    match (&summary.vector, &backends.vector) {
        (Some(r), _) => println!(
            "  vector: {} files, {} chunks ({} skipped, {} removed, {} errors)",
            r.files, r.chunks, r.skipped, r.removed, r.errors
        ),
        (None, VectorSide::Unreachable(e)) => println!("  vector: unavailable ({})", e),
        (None, _) => println!("  vector: not configured"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use memory_harness_core::models::Tier;
    use memory_harness_core::store::memory::{InMemoryKeywordIndex, InMemoryVectorIndex};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Deterministic embedder: counts letters a..d; fails on "poison".
    struct LetterEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            texts
                .iter()
                .map(|t| {
                    if t.contains("poison") {
                        return Err(BackendError::Unavailable("poisoned".into()));
                    }
                    Ok(['a', 'b', 'c', 'd']
                        .iter()
                        .map(|ch| t.matches(*ch).count() as f32 + 0.1)
                        .collect())
                })
                .collect()
        }
    }

    fn embedder() -> Arc<LetterEmbedder> {
        Arc::new(LetterEmbedder {
            calls: AtomicUsize::new(0),
        })
    }

    fn setup() -> (TempDir, Scanner) {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("project");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("decisions.md"), "We decided to use PostgreSQL.").unwrap();
        fs::write(project.join("tasks.md"), "- finish the loader\n- add tests").unwrap();
        let scanner = Scanner::new(vec![(Tier::Project, project)]).unwrap();
        (tmp, scanner)
    }

    fn backends(vector: Arc<InMemoryVectorIndex>, embedder: Arc<LetterEmbedder>) -> Backends {
        Backends {
            keyword: Arc::new(InMemoryKeywordIndex::new()),
            vector: VectorSide::Ready {
                index: vector,
                embedder,
            },
        }
    }

    #[tokio::test]
    async fn test_second_run_skips_everything() {
        let (_tmp, scanner) = setup();
        let index = Arc::new(InMemoryVectorIndex::new());
        let b = backends(index.clone(), embedder());
        let indexer = Indexer::new(&scanner, ChunkParams::default(), 64);

        let first = indexer.run(&b).await.unwrap();
        assert_eq!(first.keyword_files, 2);
        let report = first.vector.unwrap();
        assert_eq!((report.files, report.skipped, report.errors), (2, 0, 0));

        let before = index.stats().await.unwrap();
        let second = indexer.run(&b).await.unwrap().vector.unwrap();
        assert_eq!((second.files, second.chunks, second.skipped), (0, 0, 2));
        assert_eq!(index.stats().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_changed_and_deleted_files() {
        let (tmp, scanner) = setup();
        let index = Arc::new(InMemoryVectorIndex::new());
        let b = backends(index.clone(), embedder());
        let indexer = Indexer::new(&scanner, ChunkParams::default(), 64);
        indexer.run(&b).await.unwrap();

        let project = tmp.path().join("project");
        fs::write(project.join("decisions.md"), "We decided to use SQLite after all.").unwrap();
        fs::remove_file(project.join("tasks.md")).unwrap();

        let report = indexer.run(&b).await.unwrap().vector.unwrap();
        assert_eq!(report.files, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(
            index.indexed_paths().await.unwrap(),
            vec![project.join("decisions.md").to_string_lossy().to_string()]
        );
    }

    #[tokio::test]
    async fn test_batches_and_per_file_errors() {
        let (tmp, scanner) = setup();
        let project = tmp.path().join("project");
        fs::write(project.join("bad.md"), "poison pill").unwrap();
        fs::write(project.join("long.md"), "abcd ".repeat(100)).unwrap();

        let emb = embedder();
        let index = Arc::new(InMemoryVectorIndex::new());
        let b = backends(index.clone(), emb.clone());
        let indexer = Indexer::new(&scanner, ChunkParams::new(50, 0).unwrap(), 4);

        let report = indexer.run(&b).await.unwrap().vector.unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(report.files, 3);
        // long.md has 10 chunks in batches of 4; the other three files one each.
        assert_eq!(emb.calls.load(Ordering::SeqCst), 3 + 3);
        let bad = project.join("bad.md").to_string_lossy().to_string();
        assert_eq!(index.fingerprint_of(&bad).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_absent_vector_side_only_rebuilds_keyword() {
        let (_tmp, scanner) = setup();
        let b = Backends {
            keyword: Arc::new(InMemoryKeywordIndex::new()),
            vector: VectorSide::Absent,
        };
        let summary = Indexer::new(&scanner, ChunkParams::default(), 64)
            .run(&b)
            .await
            .unwrap();
        assert_eq!(summary.keyword_files, 2);
        assert!(summary.vector.is_none());
    }
}
