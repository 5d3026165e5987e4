//! Priority-tiered, token-budgeted context assembly.
//!
//! Given a static priority table, pick knowledge files in ascending
//! priority order and truncate each to its token allotment so the
//! resulting bundle fits a session-start budget.
//!
//! # Algorithm
//!
//! 1. Stable-sort the resolved worklist ascending by priority (P0 first).
//! 2. For each entry compute `remaining = budget - used`.
//! 3. Stop when `remaining <= floor`, except for P0 entries under
//!    [`P0Policy::CapOnly`], which are always attempted.
//! 4. Limit the entry to `min(max_tokens, remaining)`, or to `max_tokens`
//!    alone for P0 under `CapOnly`.
//! 5. Cut over-long content and append [`TRUNCATION_MARKER`] so the
//!    estimate of content plus marker stays within the limit.
//! 6. Charge the section's estimate against the budget.
//!
//! File access is injected through a reader closure; this module does no
//! I/O of its own.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::Tier;
use crate::tokens::TokenEstimator;

/// Appended to any section that was cut to fit its limit.
pub const TRUNCATION_MARKER: &str = "\n[...truncated]";

/// First line of a rendered bundle.
pub const BUNDLE_HEADER: &str = "=== PERSISTENT MEMORY ===";

/// Remaining budget at or below which loading stops.
pub const DEFAULT_FLOOR: usize = 50;

/// Default session-start budget in tokens.
pub const DEFAULT_BUDGET: usize = 2000;

/// What a priority-table entry points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntrySource {
    /// A fixed file name under one tier's root.
    File { tier: Tier, file: String },
    /// The most recently modified non-empty session log of the project.
    LatestSession,
}

/// One row of the priority table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityEntry {
    #[serde(flatten)]
    pub source: EntrySource,
    /// 0 loads first; higher numbers load later.
    pub priority: u8,
    /// Hard cap for this entry, never exceeded even if budget remains.
    pub max_tokens: usize,
}

impl PriorityEntry {
    pub fn file(tier: Tier, file: &str, priority: u8, max_tokens: usize) -> Self {
        Self {
            source: EntrySource::File {
                tier,
                file: file.to_string(),
            },
            priority,
            max_tokens,
        }
    }

    pub fn latest_session(priority: u8, max_tokens: usize) -> Self {
        Self {
            source: EntrySource::LatestSession,
            priority,
            max_tokens,
        }
    }
}

/// The built-in priority table.
///
/// | Tier | File | Priority | Max tokens |
/// |------|------|----------|------------|
/// | project | `project-context.md` | 0 | 600 |
/// | global | `user-profile.md` | 0 | 400 |
/// | project | `tasks.md` | 0 | 400 |
/// | project | `decisions.md` | 1 | 400 |
/// | project | latest session log | 1 | 300 |
/// | global | `voice.md` | 2 | 200 |
/// | global | `tool-environment.md` | 2 | 200 |
pub fn default_priorities() -> Vec<PriorityEntry> {
    vec![
        PriorityEntry::file(Tier::Project, "project-context.md", 0, 600),
        PriorityEntry::file(Tier::Global, "user-profile.md", 0, 400),
        PriorityEntry::file(Tier::Project, "tasks.md", 0, 400),
        PriorityEntry::file(Tier::Project, "decisions.md", 1, 400),
        PriorityEntry::latest_session(1, 300),
        PriorityEntry::file(Tier::Global, "voice.md", 2, 200),
        PriorityEntry::file(Tier::Global, "tool-environment.md", 2, 200),
    ]
}

/// How priority-0 entries interact with the overall budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum P0Policy {
    /// P0 entries are bounded by their own cap only. If the P0 caps add up
    /// to more than the budget, the bundle exceeds the budget.
    #[default]
    CapOnly,
    /// P0 entries obey the floor and remaining budget like every other
    /// tier; the bundle never exceeds the budget.
    BudgetBounded,
}

/// A worklist entry with its file resolved on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub label: String,
    pub path: PathBuf,
    pub priority: u8,
    pub max_tokens: usize,
}

/// One labeled section of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub label: String,
    pub content: String,
    pub tokens: usize,
    pub truncated: bool,
}

/// Output of [`assemble`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextBundle {
    pub sections: Vec<Section>,
    pub tokens_used: usize,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Render between the fixed header and a footer reporting tokens used.
    ///
    /// An empty bundle renders as the empty string.
    pub fn render(&self) -> String {
        if self.sections.is_empty() {
            return String::new();
        }
        let body = self
            .sections
            .iter()
            .map(|s| format!("### {}\n{}", s.label, s.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        format!(
            "{}\n\n{}\n\n=== END MEMORY ({} tokens) ===",
            BUNDLE_HEADER, body, self.tokens_used
        )
    }
}

/// Knobs for [`assemble`].
#[derive(Debug, Clone, Copy)]
pub struct BudgetParams {
    pub budget: usize,
    pub floor: usize,
    pub p0_policy: P0Policy,
}

impl Default for BudgetParams {
    fn default() -> Self {
        Self {
            budget: DEFAULT_BUDGET,
            floor: DEFAULT_FLOOR,
            p0_policy: P0Policy::default(),
        }
    }
}

/// Build a bundle from a resolved worklist.
///
/// `read` returns the trimmed, non-empty contents of a file, or `None`
/// when the file is missing, empty, or unreadable. It is only called for
/// entries that survive the budget checks.
pub fn assemble<F>(
    entries: &[ResolvedEntry],
    params: &BudgetParams,
    estimator: &dyn TokenEstimator,
    mut read: F,
) -> ContextBundle
where
    F: FnMut(&Path) -> Option<String>,
{
    let mut order: Vec<&ResolvedEntry> = entries.iter().collect();
    order.sort_by_key(|e| e.priority);

    let mut bundle = ContextBundle::default();

    for entry in order {
        let remaining = params.budget.saturating_sub(bundle.tokens_used);
        let unconditional = entry.priority == 0 && params.p0_policy == P0Policy::CapOnly;

        if !unconditional && remaining <= params.floor {
            break;
        }

        let limit = if unconditional {
            entry.max_tokens
        } else {
            entry.max_tokens.min(remaining)
        };

        let content = match read(&entry.path) {
            Some(c) if !c.is_empty() => c,
            _ => continue,
        };

        let Some((content, truncated)) = fit_to_limit(content, limit, estimator) else {
            continue;
        };

        let tokens = estimator.estimate(&content);
        bundle.tokens_used += tokens;
        bundle.sections.push(Section {
            label: entry.label.clone(),
            content,
            tokens,
            truncated,
        });
    }

    bundle
}

/// Cut `content` so its estimate, marker included, is within `limit`.
///
/// Returns `None` when not even the marker fits.
fn fit_to_limit(
    content: String,
    limit: usize,
    estimator: &dyn TokenEstimator,
) -> Option<(String, bool)> {
    if estimator.estimate(&content) <= limit {
        return Some((content, false));
    }

    let marker_tokens = estimator.estimate(TRUNCATION_MARKER);
    if marker_tokens > limit {
        return None;
    }

    let mut keep = limit - marker_tokens;
    loop {
        let cut = format!("{}{}", estimator.truncate(&content, keep), TRUNCATION_MARKER);
        if estimator.estimate(&cut) <= limit {
            return Some((cut, true));
        }
        if keep == 0 {
            return None;
        }
        keep -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::CharRatioEstimator;
    use std::collections::HashMap;

    fn entry(label: &str, priority: u8, max_tokens: usize) -> ResolvedEntry {
        ResolvedEntry {
            label: label.to_string(),
            path: PathBuf::from(format!("/mem/{}", label)),
            priority,
            max_tokens,
        }
    }

    fn reader(files: &[(&str, String)]) -> impl FnMut(&Path) -> Option<String> {
        let map: HashMap<PathBuf, String> = files
            .iter()
            .map(|(name, body)| (PathBuf::from(format!("/mem/{}", name)), body.clone()))
            .collect();
        move |p: &Path| map.get(p).cloned()
    }

    fn params(budget: usize, p0_policy: P0Policy) -> BudgetParams {
        BudgetParams {
            budget,
            floor: DEFAULT_FLOOR,
            p0_policy,
        }
    }

    #[test]
    fn test_empty_corpus_empty_bundle() {
        let entries = vec![entry("a.md", 0, 600), entry("b.md", 1, 400)];
        let bundle = assemble(
            &entries,
            &BudgetParams::default(),
            &CharRatioEstimator,
            reader(&[]),
        );
        assert!(bundle.is_empty());
        assert_eq!(bundle.tokens_used, 0);
        assert_eq!(bundle.render(), "");
    }

    #[test]
    fn test_priority_order_is_stable() {
        let entries = vec![
            entry("late.md", 2, 100),
            entry("first.md", 0, 100),
            entry("second.md", 0, 100),
            entry("middle.md", 1, 100),
        ];
        let files = [
            ("late.md", "late".repeat(10)),
            ("first.md", "first".repeat(10)),
            ("second.md", "second".repeat(10)),
            ("middle.md", "middle".repeat(10)),
        ];
        let bundle = assemble(
            &entries,
            &BudgetParams::default(),
            &CharRatioEstimator,
            reader(&files),
        );
        let labels: Vec<&str> = bundle.sections.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["first.md", "second.md", "middle.md", "late.md"]);
    }

    #[test]
    fn test_cap_applies_even_with_budget_left() {
        let entries = vec![entry("decisions.md", 1, 100)];
        let files = [("decisions.md", "d".repeat(4000))];
        let bundle = assemble(
            &entries,
            &BudgetParams::default(),
            &CharRatioEstimator,
            reader(&files),
        );
        assert_eq!(bundle.sections[0].tokens, 100);
        assert!(bundle.sections[0].truncated);
        assert!(bundle.sections[0].content.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_two_p0_caps_exceed_budget_under_cap_only() {
        let entries = vec![entry("a.md", 0, 600), entry("b.md", 0, 600)];
        let files = [("a.md", "a".repeat(4000)), ("b.md", "b".repeat(4000))];
        let bundle = assemble(
            &entries,
            &params(1000, P0Policy::CapOnly),
            &CharRatioEstimator,
            reader(&files),
        );
        assert_eq!(bundle.sections.len(), 2);
        assert_eq!(bundle.sections[0].tokens, 600);
        assert_eq!(bundle.sections[1].tokens, 600);
        assert_eq!(bundle.tokens_used, 1200);
    }

    #[test]
    fn test_two_p0_caps_bounded_by_budget() {
        let entries = vec![entry("a.md", 0, 600), entry("b.md", 0, 600)];
        let files = [("a.md", "a".repeat(4000)), ("b.md", "b".repeat(4000))];
        let bundle = assemble(
            &entries,
            &params(1000, P0Policy::BudgetBounded),
            &CharRatioEstimator,
            reader(&files),
        );
        assert_eq!(bundle.sections[0].tokens, 600);
        assert_eq!(bundle.sections[1].tokens, 400);
        assert_eq!(bundle.tokens_used, 1000);
    }

    #[test]
    fn test_p0_attempted_when_lower_tiers_are_skipped() {
        let entries = vec![
            entry("p2.md", 2, 400),
            entry("p1.md", 1, 400),
            entry("p0.md", 0, 180),
        ];
        let files = [
            ("p0.md", "z".repeat(2000)),
            ("p1.md", "y".repeat(2000)),
            ("p2.md", "x".repeat(2000)),
        ];
        let bundle = assemble(
            &entries,
            &params(200, P0Policy::CapOnly),
            &CharRatioEstimator,
            reader(&files),
        );
        let labels: Vec<&str> = bundle.sections.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["p0.md"]);
        assert_eq!(bundle.tokens_used, 180);
    }

    #[test]
    fn test_budget_never_exceeded_when_bounded() {
        let entries: Vec<ResolvedEntry> = (0..6)
            .map(|i| entry(&format!("f{}.md", i), (i % 3) as u8, 300))
            .collect();
        let files: Vec<(String, String)> = (0..6)
            .map(|i| (format!("f{}.md", i), "w".repeat(500 + i * 400)))
            .collect();
        let files_ref: Vec<(&str, String)> =
            files.iter().map(|(n, b)| (n.as_str(), b.clone())).collect();

        for budget in [0, 49, 50, 51, 100, 333, 700, 1000, 5000] {
            let bundle = assemble(
                &entries,
                &params(budget, P0Policy::BudgetBounded),
                &CharRatioEstimator,
                reader(&files_ref),
            );
            let sum: usize = bundle.sections.iter().map(|s| s.tokens).sum();
            assert_eq!(sum, bundle.tokens_used);
            assert!(sum <= budget, "budget {} exceeded: {}", budget, sum);
        }
    }

    #[test]
    fn test_stops_at_floor() {
        let entries = vec![entry("big.md", 1, 1000), entry("small.md", 2, 100)];
        let files = [("big.md", "b".repeat(3800)), ("small.md", "s".repeat(40))];
        // 950 used of 1000 leaves 50, which is at the floor.
        let bundle = assemble(
            &entries,
            &params(1000, P0Policy::CapOnly),
            &CharRatioEstimator,
            reader(&files),
        );
        assert_eq!(bundle.tokens_used, 950);
        assert_eq!(bundle.sections.len(), 1);
    }

    #[test]
    fn test_missing_files_skipped_not_fatal() {
        let entries = vec![entry("gone.md", 0, 100), entry("here.md", 1, 100)];
        let files = [("here.md", "present".to_string())];
        let bundle = assemble(
            &entries,
            &BudgetParams::default(),
            &CharRatioEstimator,
            reader(&files),
        );
        assert_eq!(bundle.sections.len(), 1);
        assert_eq!(bundle.sections[0].label, "here.md");
    }

    #[test]
    fn test_render_format() {
        let entries = vec![entry("Project: tasks.md", 0, 400)];
        let body = "- ship the loader".to_string();
        let bundle = assemble(
            &entries,
            &BudgetParams::default(),
            &CharRatioEstimator,
            |_p: &Path| Some(body.clone()),
        );
        let text = bundle.render();
        assert!(text.starts_with("=== PERSISTENT MEMORY ===\n\n### Project: tasks.md\n"));
        assert!(text.ends_with("=== END MEMORY (4 tokens) ==="));
    }

    #[test]
    fn test_default_priorities_shape() {
        let table = default_priorities();
        assert_eq!(table.len(), 7);
        assert_eq!(table.iter().filter(|e| e.priority == 0).count(), 3);
        assert!(table
            .iter()
            .any(|e| e.source == EntrySource::LatestSession && e.priority == 1));
    }
}
