//! `mem init`: create the memory directories and index schemas.
//!
//! Idempotent; running it again leaves existing files alone.

use anyhow::{Context, Result};
use std::path::Path;

use memory_harness_core::store::KeywordIndex;

use crate::config::{redact_url, Config};
use crate::keyword::SqliteKeywordIndex;
use crate::vector::open_vector_index;

pub async fn run_init(config: &Config) -> Result<()> {
    let global = &config.memory.global_root;
    let project = &config.memory.project_root;
    let sessions = project.join(&config.context.sessions_dir);

    for dir in [global.as_path(), project.as_path(), sessions.as_path()] {
        create_dir(dir)?;
    }

    let keyword = SqliteKeywordIndex::open(&config.keyword_db_path()).await?;
    let keyword_path = keyword.path().to_path_buf();
    keyword.close().await;

    println!("mem init");
    println!("  global root:   {}", global.display());
    println!("  project root:  {}", project.display());
    println!("  sessions:      {}", sessions.display());
    println!("  keyword index: {}", keyword_path.display());

    match &config.vector.url {
        Some(url) => {
            let index = open_vector_index(config)
                .await
                .with_context(|| format!("Failed to initialize vector index at {}", redact_url(url)))?;
            if let Some(index) = index {
                println!("  vector index:  {} ({})", index.name(), redact_url(url));
                index.close().await;
            }
        }
        None => println!("  vector index:  not configured"),
    }

    Ok(())
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    tracing::debug!(path = %dir.display(), "ensured directory");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_dirs_and_keyword_db() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.memory.global_root = tmp.path().join("home/.claude/memory");
        config.memory.project_root = tmp.path().join("repo/.claude/memory");

        run_init(&config).await.unwrap();
        run_init(&config).await.unwrap();

        assert!(config.memory.global_root.is_dir());
        assert!(config.memory.project_root.join("sessions").is_dir());
        assert!(config.keyword_db_path().is_file());
    }
}
