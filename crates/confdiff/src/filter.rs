//! Volatile line filtering.
//!
//! A line is volatile when it only records clock state or when the
//! configuration was last touched. Matching is case-insensitive and applies to
//! comment lines as well: a `! Last configuration change ...` banner is dropped
//! even though it is a comment. Blank lines and every other comment survive.

use regex::RegexSet;
use std::sync::LazyLock;

static VOLATILE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        // clock timezone / summer-time / calendar-valid
        r"(?i)^\s*clock\b",
        r"(?i)\bntp\s+clock-period\b",
        // NX-OS "!Time: ..." header
        r"(?i)^\s*!\s*time:",
        r"(?i)last configuration change",
        r"(?i)no configuration change since last restart",
        r"(?i)nvram config last updated",
        // Junos "## Last commit: ..." / "## Last changed: ..."
        r"(?i)^\s*#+\s*last (commit|changed):",
    ])
    .unwrap_or_else(|_| RegexSet::empty())
});

/// Whether a single line carries only volatile state.
pub fn is_volatile(line: &str) -> bool {
    VOLATILE.is_match(line)
}

/// Split text into lines and drop the volatile ones.
///
/// Line order is preserved; line terminators (`\n` or `\r\n`) are removed.
pub fn filter_volatile(text: &str) -> Vec<&str> {
    text.lines().filter(|line| !is_volatile(line)).collect()
}
