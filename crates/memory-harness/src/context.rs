//! Session-start context loading.
//!
//! Resolves the priority table against the two memory roots, finds the
//! latest session log, and hands the worklist to the core assembler with
//! a file reader. Independent of both search indexes.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use memory_harness_core::budget::{assemble, ContextBundle, EntrySource, ResolvedEntry};
use memory_harness_core::models::Tier;
use memory_harness_core::tokens::TokenEstimator;

use crate::config::{Config, ContextConfig};

/// Assemble a context bundle within `budget` tokens (config default when
/// `None`).
pub fn load_context(
    global_root: &Path,
    project_root: &Path,
    budget: Option<usize>,
    config: &ContextConfig,
    estimator: &dyn TokenEstimator,
) -> ContextBundle {
    let worklist = resolve_worklist(global_root, project_root, config);
    let params = config.budget_params(budget);
    tracing::debug!(
        entries = worklist.len(),
        budget = params.budget,
        "assembling context bundle"
    );
    assemble(&worklist, &params, estimator, read_trimmed)
}

/// Run `mem load`: print the bundle, or `{"text","tokens"}` with `--json`.
///
/// An empty bundle prints nothing in text mode.
pub fn run_load(config: &Config, budget: Option<usize>, json: bool) -> Result<()> {
    let bundle = load_context(
        &config.memory.global_root,
        &config.memory.project_root,
        budget,
        &config.context,
        &memory_harness_core::tokens::CharRatioEstimator,
    );
    let text = bundle.render();

    if json {
        let out = serde_json::json!({ "text": text, "tokens": bundle.tokens_used });
        println!("{}", serde_json::to_string(&out)?);
    } else if !text.is_empty() {
        println!("{}", text);
    }
    Ok(())
}

/// Map each priority entry to a concrete file and display label.
///
/// A `LatestSession` entry with no session log is dropped.
pub fn resolve_worklist(
    global_root: &Path,
    project_root: &Path,
    config: &ContextConfig,
) -> Vec<ResolvedEntry> {
    config
        .priorities
        .iter()
        .filter_map(|entry| {
            let (label, path) = match &entry.source {
                EntrySource::File { tier, file } => {
                    let root = match tier {
                        Tier::Global => global_root,
                        Tier::Project => project_root,
                    };
                    let prefix = match tier {
                        Tier::Global => "Global",
                        Tier::Project => "Project",
                    };
                    (format!("{}: {}", prefix, file), root.join(file))
                }
                EntrySource::LatestSession => {
                    let path = latest_session(&project_root.join(&config.sessions_dir))?;
                    let name = path.file_stem()?.to_string_lossy().to_string();
                    (format!("Last Session: {}", name), path)
                }
            };
            Some(ResolvedEntry {
                label,
                path,
                priority: entry.priority,
                max_tokens: entry.max_tokens,
            })
        })
        .collect()
}

/// Most recently modified non-empty, non-hidden `.md` file in `dir`.
///
/// Ties on modification time go to the larger file name.
pub fn latest_session(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;

    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let path = e.path();
            let name = e.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || path.extension().and_then(|x| x.to_str()) != Some("md") {
                return None;
            }
            let meta = e.metadata().ok()?;
            if !meta.is_file() || meta.len() == 0 {
                return None;
            }
            let text = std::fs::read_to_string(&path).ok()?;
            if text.trim().is_empty() {
                return None;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            Some((modified, name, path))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, _, path)| path)
}

/// Trimmed file contents; `None` when missing, unreadable or blank.
fn read_trimmed(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %path.display(), error = %e, "skipping unreadable memory file");
            }
            None
        }
    }
}
