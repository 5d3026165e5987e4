//! Knowledge-file discovery.
//!
//! Walks the global and project memory roots and yields every non-empty
//! file matching the include globs. Hidden files and directories (name
//! starting with `.`) are skipped, which also keeps the keyword index file
//! out of the corpus. Within a root, entries are visited in file-name
//! order.

use anyhow::Result;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use memory_harness_core::chunk::fingerprint;
use memory_harness_core::models::{KnowledgeFile, Tier};

pub struct Scanner {
    roots: Vec<(Tier, PathBuf)>,
    include: GlobSet,
}

impl Scanner {
    /// Scanner over `roots` with the default `**/*.md` include glob.
    pub fn new(roots: Vec<(Tier, PathBuf)>) -> Result<Self> {
        Self::with_globs(roots, &["**/*.md".to_string()])
    }

    pub fn with_globs(roots: Vec<(Tier, PathBuf)>, include_globs: &[String]) -> Result<Self> {
        Ok(Self {
            roots,
            include: build_globset(include_globs)?,
        })
    }

    pub fn roots(&self) -> &[(Tier, PathBuf)] {
        &self.roots
    }

    /// Lazily enumerate knowledge files. Each call rescans disk.
    ///
    /// Missing roots contribute nothing. Unreadable or non-UTF-8 files
    /// are skipped.
    pub fn files(&self) -> impl Iterator<Item = KnowledgeFile> + '_ {
        self.roots
            .iter()
            .flat_map(move |(tier, root)| self.files_in(*tier, root))
    }

    /// Number of candidate files per root, without reading contents.
    pub fn count_candidates(&self, root: &Path) -> usize {
        self.candidates(root).count()
    }

    fn candidates<'a>(&'a self, root: &'a Path) -> impl Iterator<Item = DirEntry> + 'a {
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(move |e| {
                let relative = e.path().strip_prefix(root).unwrap_or(e.path());
                self.include.is_match(relative)
            })
    }

    fn files_in<'a>(&'a self, tier: Tier, root: &'a Path) -> impl Iterator<Item = KnowledgeFile> + 'a {
        self.candidates(root)
            .filter_map(move |entry| read_knowledge_file(entry.path(), tier))
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn read_knowledge_file(path: &Path, tier: Tier) -> Option<KnowledgeFile> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "skipping unreadable file");
            return None;
        }
    };
    if text.trim().is_empty() {
        return None;
    }

    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Some(KnowledgeFile {
        path: path.to_path_buf(),
        tier,
        fingerprint: fingerprint(&text),
        text,
        modified,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
