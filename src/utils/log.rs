// src/utils/log.rs

//! Console presentation helpers with server-style formatting.
//!
//! Diagnostics go through the `log` facade; these helpers are for the
//! human-facing run summaries the CLI prints.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;

/// Suppresses all console output when set (e.g. `--json` mode).
static QUIET: AtomicBool = AtomicBool::new(false);

pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

fn enabled() -> bool {
    !QUIET.load(Ordering::Relaxed)
}

/// Prefix a line with local timestamp and level.
fn format_line(level: &str, message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{}] [{}] {}", timestamp, level, message)
}

/// Print an informational line
pub fn info(message: &str) {
    if enabled() {
        println!("{}", format_line("INFO", message));
    }
}

/// Print a success line (always shown as INFO)
pub fn success(message: &str) {
    if enabled() {
        println!("{}", format_line("INFO", &format!("✓ {}", message)));
    }
}

/// Print a warning line to stderr
pub fn warn(message: &str) {
    if enabled() {
        eprintln!("{}", format_line("WARN", message));
    }
}

/// Print a header
pub fn header(title: &str) {
    if enabled() {
        let border = "═".repeat(60);
        println!("{}", format_line("INFO", &border));
        println!("{}", format_line("INFO", &format!("  {}", title)));
        println!("{}", format_line("INFO", &border));
    }
}

/// Print a sub-item (indented)
pub fn sub_item(message: &str) {
    if enabled() {
        println!("{}", format_line("INFO", &format!("    {}", message)));
    }
}

/// Print a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    if enabled() {
        println!();
        println!("{}", format_line("INFO", &format!("[SUMMARY] {}", title)));
        for (key, value) in items {
            println!("{}", format_line("INFO", &format!("    {}: {}", key, value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line_shape() {
        let line = format_line("WARN", "adapter failed");
        assert!(line.contains("] [WARN] adapter failed"));
        assert!(line.starts_with('['));
    }
}
