//! Memory capture (`mem remember`).
//!
//! Appends one dated bullet to the knowledge file the text belongs in. The
//! text is scanned for credentials first and refused if any are found, so
//! secrets never land in files that are later injected into prompts.
//!
//! # Classification
//!
//! Checked in order, first match wins:
//!
//! | Signal | File | Section |
//! |--------|------|---------|
//! | decision words ("decided", "went with", "trade-off", …) | project `decisions.md` | Decisions |
//! | task words ("todo", "pending", "blocked on", …) | project `tasks.md` | Active |
//! | first-person preference ("I prefer", "call me", …) | global `user-profile.md` | Preferences |
//! | style words ("tone", "concise", "emoji", …) | global `voice.md` | Style |
//! | tool words ("editor", "docker", "npm", …) | global `tool-environment.md` | Tools |
//! | anything else | project `project-context.md` | Notes |

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

use memory_harness_core::models::Tier;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("nothing to remember")]
    Empty,

    #[error("secret detected, refusing to write (matched: {})", .0.join(", "))]
    SecretDetected(Vec<String>),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The two memory roots a capture may write into.
#[derive(Debug, Clone)]
pub struct MemoryRoots {
    pub global: PathBuf,
    pub project: PathBuf,
}

impl MemoryRoots {
    pub fn root_for(&self, tier: Tier) -> &Path {
        match tier {
            Tier::Global => &self.global,
            Tier::Project => &self.project,
        }
    }
}

/// Where a capture should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub tier: Tier,
    pub file: &'static str,
    pub section: &'static str,
}

/// What was written.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureReceipt {
    pub tier: Tier,
    pub path: PathBuf,
    pub section: String,
    pub entry: String,
}

struct SecretPattern {
    name: &'static str,
    regex: Regex,
}

fn secret_patterns() -> &'static [SecretPattern] {
    static PATTERNS: OnceLock<Vec<SecretPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            ("OpenAI key", r"sk-[a-zA-Z0-9]{20,}"),
            ("Anthropic key", r"sk-ant-[a-zA-Z0-9-]{20,}"),
            ("GitHub token", r"gh[po]_[a-zA-Z0-9]{36,}"),
            ("GitHub fine-grained token", r"github_pat_[a-zA-Z0-9_]{20,}"),
            ("AWS access key", r"AKIA[0-9A-Z]{16}"),
            ("Slack token", r"xox[bp]-[0-9a-zA-Z-]{20,}"),
            ("private key", r"-----BEGIN (?:RSA |EC |DSA )?PRIVATE KEY-----"),
            ("password assignment", r#"(?i)password\s*[:=]\s*["'][^"']{8,}["']"#),
            (
                "API key assignment",
                r#"(?i)(?:api[_-]?key|apikey|secret[_-]?key)\s*[:=]\s*["'][^"']{8,}["']"#,
            ),
            ("MongoDB URL", r"mongodb\+srv://\S+"),
            ("Postgres URL with credentials", r"postgres(?:ql)?://\S+:\S+@"),
        ]
        .into_iter()
        .filter_map(|(name, pattern)| {
            Regex::new(pattern)
                .ok()
                .map(|regex| SecretPattern { name, regex })
        })
        .collect()
    })
}

/// Names of the secret patterns found in `text`; empty when clean.
pub fn find_secrets(text: &str) -> Vec<String> {
    secret_patterns()
        .iter()
        .filter(|p| p.regex.is_match(text))
        .map(|p| p.name.to_string())
        .collect()
}

const DECISION_WORDS: &[&str] = &[
    "decided",
    "decision",
    "chose",
    "chosen",
    "went with",
    "adr",
    "trade-off",
    "tradeoff",
    "because we",
];

const TASK_WORDS: &[&str] = &[
    "todo",
    "to-do",
    "task",
    "next time",
    "remember to",
    "don't forget",
    "pending",
    "blocked on",
];

const STYLE_WORDS: &[&str] = &[
    "tone", "style", "verbose", "concise", "formal", "casual", "emoji", "brief", "detailed",
];

const TOOL_WORDS: &[&str] = &[
    "tool",
    "editor",
    "ide",
    "terminal",
    "shell",
    "os ",
    "macos",
    "linux",
    "windows",
    "docker",
    "node version",
    "python version",
    "bun",
    "npm",
    "yarn",
    "pnpm",
];

fn preference_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"\b(?:i prefer|i like|i always|i never|i want|i use|my name|my email|my role|call me|i am a|don't call|always use|never use)\b",
            )
            .ok()
        })
        .as_ref()
}

/// Pick the file and section for `text`.
pub fn classify(text: &str) -> Target {
    let lower = text.to_lowercase();
    let has_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has_any(DECISION_WORDS) {
        return Target {
            tier: Tier::Project,
            file: "decisions.md",
            section: "Decisions",
        };
    }
    if has_any(TASK_WORDS) {
        return Target {
            tier: Tier::Project,
            file: "tasks.md",
            section: "Active",
        };
    }
    if preference_pattern().is_some_and(|re| re.is_match(&lower)) {
        return Target {
            tier: Tier::Global,
            file: "user-profile.md",
            section: "Preferences",
        };
    }
    if has_any(STYLE_WORDS) {
        return Target {
            tier: Tier::Global,
            file: "voice.md",
            section: "Style",
        };
    }
    if has_any(TOOL_WORDS) {
        return Target {
            tier: Tier::Global,
            file: "tool-environment.md",
            section: "Tools",
        };
    }
    Target {
        tier: Tier::Project,
        file: "project-context.md",
        section: "Notes",
    }
}

/// Classify `text` and append it to the matching knowledge file.
pub fn remember(
    text: &str,
    roots: &MemoryRoots,
    now: DateTime<Utc>,
) -> Result<CaptureReceipt, CaptureError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CaptureError::Empty);
    }

    let secrets = find_secrets(text);
    if !secrets.is_empty() {
        tracing::warn!(patterns = ?secrets, "refusing to store text containing secrets");
        return Err(CaptureError::SecretDetected(secrets));
    }

    let target = classify(text);
    let path = roots.root_for(target.tier).join(target.file);
    let entry = format!("- [{}] {}", now.format("%Y-%m-%d"), text);

    append_to_section(&path, target.section, &entry).map_err(|source| CaptureError::Io {
        path: path.clone(),
        source,
    })?;
    tracing::info!(path = %path.display(), section = target.section, "memory captured");

    Ok(CaptureReceipt {
        tier: target.tier,
        path,
        section: target.section.to_string(),
        entry,
    })
}

/// Append `entry` at the end of the `## {section}` block of `path`.
///
/// A missing file starts with a `# Title` derived from its stem; a missing
/// section is added at the end.
pub fn append_to_section(path: &Path, section: &str, entry: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let existing = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            format!("# {}\n", title_from_stem(path))
        }
        Err(e) => return Err(e),
    };

    std::fs::write(path, insert_entry(&existing, section, entry))
}

fn insert_entry(existing: &str, section: &str, entry: &str) -> String {
    let heading = format!("## {}", section);
    let mut lines: Vec<&str> = existing.lines().collect();

    let Some(start) = lines.iter().position(|l| l.trim() == heading) else {
        let mut out = existing.trim_end().to_string();
        out.push_str(&format!("\n\n{}\n\n{}\n", heading, entry));
        return out;
    };

    let end = lines[start + 1..]
        .iter()
        .position(|l| l.starts_with("## "))
        .map(|i| start + 1 + i)
        .unwrap_or(lines.len());
    // After the section's last non-blank line, keeping the gap before the next heading.
    let insert_at = (start + 1..end)
        .rev()
        .find(|&i| !lines[i].trim().is_empty())
        .map(|i| i + 1)
        .unwrap_or(start + 1);

    if insert_at == start + 1 {
        lines.insert(insert_at, "");
        lines.insert(insert_at + 1, entry);
    } else {
        lines.insert(insert_at, entry);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn title_from_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    stem.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
