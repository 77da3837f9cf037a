use colored::Colorize;
use serde_json::Value;
use std::io::{self, Write};

/// Pretty-print the envelope (or bare value) as JSON on stdout.
pub fn print_json(value: &Value) {
    let rendered = match serde_json::to_string_pretty(value) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}: {}", "JSON serialization error".red(), e);
            return;
        }
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let _ = writeln!(out, "{}", rendered);
}
