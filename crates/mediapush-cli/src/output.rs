//! Terminal output for humans and for scripts
//!
//! Commands talk to a [`OutputFormatter`]; `--json` swaps the human
//! formatter for one that prints machine-readable objects on stdout and
//! level-tagged messages on stderr.

use serde_json::{json, Value};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    /// Aligned `label: value` line
    fn field(&self, label: &str, value: &str);
    fn print_json(&self, value: &Value);
}

/// Checkmarks on stdout, warnings and errors on stderr
pub struct HumanFormatter {
    quiet: bool,
}

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {message}");
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {message}");
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {message}");
    }
    fn info(&self, message: &str) {
        if !self.quiet {
            println!("  {message}");
        }
    }
    fn field(&self, label: &str, value: &str) {
        if !self.quiet {
            println!("  {:<14}{value}", format!("{label}:"));
        }
    }
    fn print_json(&self, _value: &Value) {}
}

/// Only structured results reach stdout
pub struct JsonFormatter;

impl JsonFormatter {
    fn message(level: &str, message: &str) -> Value {
        json!({ "level": level, "message": message })
    }
}

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        eprintln!("{}", Self::message("success", message));
    }
    fn error(&self, message: &str) {
        eprintln!("{}", Self::message("error", message));
    }
    fn warn(&self, message: &str) {
        eprintln!("{}", Self::message("warning", message));
    }
    fn info(&self, _message: &str) {}
    fn field(&self, _label: &str, _value: &str) {}
    fn print_json(&self, value: &Value) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("{}", Self::message("error", &e.to_string())),
        }
    }
}

pub fn get_formatter(format: OutputFormat, quiet: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter { quiet }),
    }
}

/// Formats a byte count with binary units, e.g. `1.5 GiB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
