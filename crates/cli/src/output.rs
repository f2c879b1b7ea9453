//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No locations found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(&items) {
                println!("{}", json);
            }
        }
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message to stderr
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message to stderr, keeping stdout machine-readable
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue().bold(), message);
}

/// Six decimal places, roughly 10 cm
pub fn format_coordinate(degrees: f64) -> String {
    format!("{:.6}", degrees)
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "stored" | "reachable" => status.green().to_string(),
        "missing" | "unreachable" => status.red().to_string(),
        _ => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_coordinate() {
        assert_eq!(format_coordinate(37.33182), "37.331820");
        assert_eq!(format_coordinate(-122.0), "-122.000000");
    }

    #[test]
    fn test_color_status_keeps_text() {
        colored::control::set_override(false);
        assert_eq!(color_status("stored"), "stored");
        assert_eq!(color_status("unreachable"), "unreachable");
        assert_eq!(color_status("unknown"), "unknown");
    }
}
