//! Terminal output helpers. Logging goes through `log`; this is for the
//! human-facing report lines.

use colored::{ColoredString, Colorize};

pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Errors go to stderr so `netkeep show` output stays pipeable.
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Bold title with an underline sized to it.
pub fn header(title: &str) {
    let rule = "─".repeat(title.chars().count());
    println!("\n{}\n{}", title.bold(), rule.dimmed());
}

pub fn section(title: &str) {
    println!("\n{}", title.cyan().bold());
}

pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Pass/fail mark for check and outcome lines.
pub fn mark(ok: bool) -> ColoredString {
    if ok { "✓".green() } else { "✗".red() }
}

/// One indented check line: mark, subject, then a dimmed detail.
pub fn check(ok: bool, subject: &str, detail: &str) {
    let detail = if ok { detail.dimmed() } else { detail.red() };
    println!("  {} {} {}", mark(ok), subject, detail);
}

/// Print a unified diff with added/removed lines colored
pub fn diff(text: &str) {
    for line in text.lines() {
        let styled = match line.as_bytes().first() {
            _ if line.starts_with("+++") || line.starts_with("---") => line.bold(),
            Some(b'@') if line.starts_with("@@") => line.cyan(),
            Some(b'+') => line.green(),
            Some(b'-') => line.red(),
            _ => line.normal(),
        };
        println!("{styled}");
    }
}

const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

/// Human-readable byte size (1024-based).
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// `1 device`, `2 devices`
pub fn plural(count: usize, noun: &str) -> String {
    let suffix = if count == 1 { "" } else { "s" };
    format!("{count} {noun}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(2 * 1024 * 1024 * 1024), "2.0 GB");
    }

    #[test]
    fn test_plural() {
        assert_eq!(plural(1, "device"), "1 device");
        assert_eq!(plural(0, "record"), "0 records");
        assert_eq!(plural(3, "record"), "3 records");
    }
}
