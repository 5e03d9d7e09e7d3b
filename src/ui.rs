//! Terminal output for tidyup
//!
//! Sizes use binary units everywhere, both when printed and when read from
//! the config file.

use colored::{ColoredString, Colorize};
use thiserror::Error;

pub fn info(msg: &str) {
    println!("{} {msg}", "ℹ".blue());
}

pub fn success(msg: &str) {
    println!("{} {msg}", "✓".green());
}

pub fn warn(msg: &str) {
    println!("{} {msg}", "⚠".yellow());
}

/// Errors go to stderr
pub fn error(msg: &str) {
    eprintln!("{} {msg}", "✗".red());
}

pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Title underlined to its display width
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

pub fn kv(key: &str, value: &str) {
    println!("  {}: {value}", key.dimmed());
}

// ============================================================================
// Tables
// ============================================================================

const NAME_WIDTH: usize = 28;

/// One operation in the size table
pub fn size_row(name: &str, bytes: u64) {
    println!("  {name:<NAME_WIDTH$} {}", size_cell(bytes));
}

/// `[2/5] pip-cache (12.0 MB)`
pub fn plan_row(num: usize, total: usize, name: &str, bytes: u64) {
    println!(
        "{} {name} ({})",
        format!("[{num}/{total}]").blue().bold(),
        format_size(bytes)
    );
}

/// Size for tables: dimmed when there is nothing to reclaim
pub fn size_cell(bytes: u64) -> ColoredString {
    let size = format_size(bytes);
    if bytes == 0 { size.dimmed() } else { size.bold() }
}

/// Keep the end of a long path, counted in chars
pub fn truncate_path(path: &str, max_len: usize) -> String {
    let len = path.chars().count();
    if len <= max_len {
        path.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let tail: String = path.chars().skip(len - (max_len - 3)).collect();
        format!("...{tail}")
    }
}

// ============================================================================
// Sizes
// ============================================================================

/// Largest unit first
const UNITS: [(&str, u64); 4] = [
    ("TB", 1 << 40),
    ("GB", 1 << 30),
    ("MB", 1 << 20),
    ("KB", 1 << 10),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SizeError {
    #[error("empty size")]
    Empty,

    #[error("invalid size '{0}' (expected a number with an optional B/KB/MB/GB/TB suffix)")]
    Invalid(String),
}

pub fn format_size(bytes: u64) -> String {
    UNITS
        .iter()
        .find(|(_, scale)| bytes >= *scale)
        .map_or_else(
            || format!("{bytes} B"),
            |(unit, scale)| format!("{:.1} {unit}", bytes as f64 / *scale as f64),
        )
}

/// `"500KB"`, `"1.5 mb"`, `"0"`. A bare number is bytes.
pub fn parse_size(text: &str) -> Result<u64, SizeError> {
    let upper = text.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Err(SizeError::Empty);
    }

    let (number, scale) = UNITS
        .iter()
        .find_map(|&(unit, scale)| upper.strip_suffix(unit).map(|n| (n, scale)))
        .or_else(|| upper.strip_suffix('B').map(|n| (n, 1)))
        .unwrap_or((upper.as_str(), 1));

    let invalid = || SizeError::Invalid(text.trim().to_string());
    let value: f64 = number.trim().parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }
    Ok((value * scale as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_picks_largest_unit() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(100 << 20), "100.0 MB");
        assert_eq!(format_size((5 << 30) / 2), "2.5 GB");
        assert_eq!(format_size(1 << 40), "1.0 TB");
    }

    #[test]
    fn test_parse_size_config_values() {
        assert_eq!(parse_size("0"), Ok(0));
        assert_eq!(parse_size("1MB"), Ok(1 << 20));
        assert_eq!(parse_size("500kb"), Ok(500 << 10));
        assert_eq!(parse_size(" 1.5 MB "), Ok(3 << 19));
        assert_eq!(parse_size("100B"), Ok(100));
    }

    #[test]
    fn test_parse_size_rejects() {
        assert_eq!(parse_size("  "), Err(SizeError::Empty));
        for bad in ["lots", "MB", "-1KB", "inf"] {
            assert!(matches!(parse_size(bad), Err(SizeError::Invalid(_))), "{bad}");
        }
    }

    #[test]
    fn test_size_cell_text() {
        colored::control::set_override(false);
        assert_eq!(size_cell(0).to_string(), "0 B");
        assert_eq!(size_cell(2048).to_string(), "2.0 KB");
    }

    #[test]
    fn test_truncate_path() {
        assert_eq!(truncate_path("/tmp/x", 20), "/tmp/x");
        assert_eq!(truncate_path("/very/long/path/to/file.txt", 15), ".../to/file.txt");
        assert_eq!(truncate_path("/données/café/thé.txt", 10), "...thé.txt");
        assert_eq!(truncate_path("test", 3), "...");
    }
}
