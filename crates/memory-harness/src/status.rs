//! Index status overview.
//!
//! Summarizes what each backend holds, whether the vector index could be
//! reached, and how many candidate files the memory directories contain.
//! Used by `mem status` to confirm that `mem index` did what it should.

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use memory_harness_core::models::{Tier, TierCount};

use crate::backends::{Backends, VectorSide};
use crate::config::{redact_url, Config};
use crate::scanner::Scanner;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub keyword: KeywordStatus,
    pub vector: VectorStatus,
    pub memory_dirs: Vec<MemoryDirStatus>,
    pub total_files: usize,
}

#[derive(Debug, Serialize)]
pub struct KeywordStatus {
    pub backend: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub files: i64,
    pub by_tier: Vec<TierCount>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VectorStatus {
    pub configured: bool,
    pub reachable: bool,
    pub backend: Option<String>,
    pub url: Option<String>,
    pub files: i64,
    pub chunks: i64,
    pub by_tier: Vec<TierCount>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MemoryDirStatus {
    pub tier: Tier,
    pub path: PathBuf,
    pub exists: bool,
    pub files: usize,
}

/// Collect the status of every backend and memory directory.
pub async fn collect_status(
    config: &Config,
    backends: &Backends,
    scanner: &Scanner,
) -> StatusReport {
    let keyword_path = config.keyword_db_path();
    let mut keyword = KeywordStatus {
        backend: backends.keyword.name().to_string(),
        size_bytes: std::fs::metadata(&keyword_path).map(|m| m.len()).unwrap_or(0),
        path: keyword_path,
        files: 0,
        by_tier: Vec::new(),
        error: None,
    };
    match backends.keyword.stats().await {
        Ok(stats) => {
            keyword.files = stats.files;
            keyword.by_tier = stats.by_tier;
        }
        Err(e) => keyword.error = Some(e.to_string()),
    }

    let mut vector = VectorStatus {
        configured: config.vector.url.is_some(),
        reachable: false,
        backend: None,
        url: config.vector.url.as_deref().map(redact_url),
        files: 0,
        chunks: 0,
        by_tier: Vec::new(),
        error: None,
    };
    match &backends.vector {
        VectorSide::Ready { index, .. } => {
            vector.backend = Some(index.name().to_string());
            match index.stats().await {
                Ok(stats) => {
                    vector.reachable = true;
                    vector.files = stats.files;
                    vector.chunks = stats.chunks;
                    vector.by_tier = stats.by_tier;
                }
                Err(e) => vector.error = Some(e.to_string()),
            }
        }
        VectorSide::Unreachable(e) => vector.error = Some(e.to_string()),
        VectorSide::Absent => {}
    }

    let memory_dirs: Vec<MemoryDirStatus> = scanner
        .roots()
        .iter()
        .map(|(tier, root)| MemoryDirStatus {
            tier: *tier,
            path: root.clone(),
            exists: root.is_dir(),
            files: scanner.count_candidates(root),
        })
        .collect();
    let total_files = memory_dirs.iter().map(|d| d.files).sum();

    StatusReport {
        keyword,
        vector,
        memory_dirs,
        total_files,
    }
}

/// Text rendering of a [`StatusReport`].
pub fn format_status(report: &StatusReport) -> String {
    let mut out = String::new();
    out.push_str("=== Memory Search Index Status ===\n\n");

    let k = &report.keyword;
    match &k.error {
        Some(e) => out.push_str(&format!("Keyword ({}): error - {}\n", k.backend, e)),
        None => {
            out.push_str(&format!(
                "Keyword ({}): {} files indexed\n",
                k.backend, k.files
            ));
            out.push_str(&format!(
                "  DB: {} ({})\n",
                k.path.display(),
                format_bytes(k.size_bytes)
            ));
            for t in &k.by_tier {
                out.push_str(&format!("  [{}] {} files\n", t.tier, t.files));
            }
        }
    }

    let v = &report.vector;
    out.push('\n');
    if !v.configured {
        out.push_str("Vector (semantic): not configured (set DATABASE_URL or [vector] url)\n");
    } else if let Some(e) = &v.error {
        out.push_str(&format!("Vector (semantic): error - {}\n", e));
    } else if !v.reachable {
        out.push_str("Vector (semantic): disabled (no embedding provider)\n");
    } else {
        out.push_str(&format!(
            "Vector ({}): {} chunks from {} files\n",
            v.backend.as_deref().unwrap_or("unknown"),
            v.chunks,
            v.files
        ));
        for t in &v.by_tier {
            out.push_str(&format!(
                "  [{}] {} files, {} chunks\n",
                t.tier, t.files, t.chunks
            ));
        }
    }
    if let Some(url) = &v.url {
        out.push_str(&format!("  URL: {}\n", url));
    }

    out.push_str("\nMemory directories:\n");
    for d in &report.memory_dirs {
        if d.exists {
            out.push_str(&format!(
                "  [{}] {}: {} files\n",
                d.tier,
                d.path.display(),
                d.files
            ));
        } else {
            out.push_str(&format!("  [{}] {}: not found\n", d.tier, d.path.display()));
        }
    }
    out.push_str(&format!("\nTotal: {} memory files\n", report.total_files));
    out
}

/// Run `mem status`.
pub async fn run_status(
    config: &Config,
    backends: &Backends,
    scanner: &Scanner,
    json: bool,
) -> Result<()> {
    let report = collect_status(config, backends, scanner).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_status(&report));
    }
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
