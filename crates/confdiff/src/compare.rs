//! Configuration comparison.

use crate::filter::filter_volatile;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

/// Header label for the baseline side of the unified diff.
pub const OLD_LABEL: &str = "old_config";

/// Header label for the new side of the unified diff.
pub const NEW_LABEL: &str = "new_config";

const CONTEXT_LINES: usize = 3;

/// Outcome of comparing two captures of the same device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Whether any non-volatile line changed
    pub has_changes: bool,
    /// Unified diff text (empty when unchanged)
    pub diff: String,
    /// Lines present only in the new capture
    pub added: usize,
    /// Lines present only in the old capture
    pub removed: usize,
}

impl DiffResult {
    /// A result describing no change.
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        summarize(self)
    }
}

/// Summarize a diff result: `"no changes"` or `"{added} lines added, {removed} lines removed"`.
pub fn summarize(result: &DiffResult) -> String {
    if !result.has_changes {
        return "no changes".to_string();
    }
    format!(
        "{} lines added, {} lines removed",
        result.added, result.removed
    )
}

/// Compare two configuration texts, ignoring volatile lines.
///
/// 1. Trimmed texts that are byte-identical are unchanged.
/// 2. Texts that are identical once volatile lines are filtered are unchanged.
/// 3. Otherwise a unified diff with 3 lines of context is computed over the
///    filtered lines, labeled `old_config` / `new_config`.
///
/// The result is deterministic: identical inputs always produce byte-identical
/// diff text and counts.
pub fn compare(old: &str, new: &str) -> DiffResult {
    let old = old.trim();
    let new = new.trim();

    if old == new {
        return DiffResult::unchanged();
    }

    let old_lines = filter_volatile(old);
    let new_lines = filter_volatile(new);

    let old_text = terminated(&old_lines);
    let new_text = terminated(&new_lines);

    if old_text.trim() == new_text.trim() {
        return DiffResult::unchanged();
    }

    let diff = TextDiff::from_lines(old_text.as_str(), new_text.as_str());

    let mut added = 0;
    let mut removed = 0;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => added += 1,
            ChangeTag::Delete => removed += 1,
            ChangeTag::Equal => {}
        }
    }

    let text = diff
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .missing_newline_hint(false)
        .header(OLD_LABEL, NEW_LABEL)
        .to_string();

    if text.trim().is_empty() {
        return DiffResult::unchanged();
    }

    DiffResult {
        has_changes: true,
        diff: text,
        added,
        removed,
    }
}

/// Join lines with a terminator after every line, so the last line diffs like the others.
fn terminated(lines: &[&str]) -> String {
    let mut text = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    text
}
