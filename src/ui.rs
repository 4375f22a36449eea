use colored::Colorize;
use std::io::{self, Write};
#[cfg(test)]
use std::sync::Mutex;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.len()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Size Formatting
// ============================================================================

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a size given in MiB
pub fn format_mib(mib: u64) -> String {
    format_size(mib.saturating_mul(MB))
}

// ============================================================================
// Line-oriented output for stage logging
// ============================================================================

/// Sink for progress output.
///
/// A step is written as `begin_line` (no newline) followed by `end_line`.
pub trait Ui: Send + Sync {
    /// Write a full line.
    fn print_line(&self, line: &str);

    /// Start a line without terminating it.
    fn begin_line(&self, text: &str);

    /// Finish the line started by [`Ui::begin_line`].
    fn end_line(&self, text: &str);
}

/// Writes to stdout.
#[derive(Debug, Default)]
pub struct ConsoleUi;

impl Ui for ConsoleUi {
    fn print_line(&self, line: &str) {
        println!("{}", line);
    }

    fn begin_line(&self, text: &str) {
        let mut stdout = io::stdout().lock();
        let _ = write!(stdout, "{}", text);
        let _ = stdout.flush();
    }

    fn end_line(&self, text: &str) {
        println!("{}", text);
    }
}

/// Records every write; each call is one entry.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct FakeUi {
    said: Mutex<Vec<String>>,
}

#[cfg(test)]
impl FakeUi {
    pub fn said(&self) -> Vec<String> {
        self.said.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.said.lock().unwrap().clear();
    }

    fn push(&self, text: &str) {
        self.said.lock().unwrap().push(text.to_string());
    }
}

#[cfg(test)]
impl Ui for FakeUi {
    fn print_line(&self, line: &str) {
        self.push(line);
    }

    fn begin_line(&self, text: &str) {
        self.push(text);
    }

    fn end_line(&self, text: &str) {
        self.push(text);
    }
}

// ============================================================================
// Tests
// ============================================================================
