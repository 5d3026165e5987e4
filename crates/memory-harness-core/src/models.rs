//! Core data models used throughout Memory Harness.
//!
//! These types represent the knowledge files, chunks, and search results
//! that flow through the indexing and retrieval pipeline.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which root a knowledge file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Cross-project knowledge that follows the user.
    Global,
    /// Repository-local knowledge.
    Project,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Global => "global",
            Tier::Project => "project",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Tier::Global),
            "project" => Ok(Tier::Project),
            other => Err(format!("unknown tier: '{}'", other)),
        }
    }
}

/// A knowledge file as read from disk.
#[derive(Debug, Clone)]
pub struct KnowledgeFile {
    /// Absolute path; the identity of the file.
    pub path: PathBuf,
    pub tier: Tier,
    pub text: String,
    /// SHA-256 of `text`, see [`crate::chunk::fingerprint`].
    pub fingerprint: String,
    pub modified: DateTime<Utc>,
}

impl KnowledgeFile {
    /// Path as the string key used by both indexes.
    pub fn key(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

/// A window of a knowledge file's text, the unit of vector indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub path: String,
    pub tier: Tier,
    pub chunk_index: i64,
    pub text: String,
    /// Fingerprint of the whole owning file at chunk time.
    pub fingerprint: String,
}

/// Which search backend produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Keyword,
    Vector,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Keyword => f.write_str("keyword"),
            Backend::Vector => f.write_str("vector"),
        }
    }
}

/// A single hit from one backend, before merging.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub path: String,
    pub tier: Tier,
    pub snippet: String,
    /// Score in `[0.0, 1.0]`, higher is better.
    pub score: f64,
    pub backend: Backend,
    /// Chunk ordinal for vector hits; keyword hits cover whole files.
    pub chunk_index: Option<i64>,
}

/// A merged, ranked result returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub path: String,
    pub tier: Tier,
    pub snippet: String,
    pub vector_score: f64,
    pub keyword_score: f64,
    pub hybrid_score: f64,
    /// Contributing backends, in the order they were first seen.
    pub sources: Vec<Backend>,
}

/// Counts produced by an index-maintenance run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Files whose chunks were (re)written.
    pub files: usize,
    /// Chunks written across those files.
    pub chunks: usize,
    /// Files left alone because their fingerprint matched.
    pub skipped: usize,
    /// Files dropped from the index because they no longer exist.
    pub removed: usize,
    /// Files that failed to embed or store.
    pub errors: usize,
}

/// Per-tier counts for status reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TierCount {
    pub tier: String,
    pub files: i64,
    pub chunks: i64,
}
