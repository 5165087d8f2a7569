// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Shared rendering helpers: colored status lines and `comfy-table` tables,
//! used by every subcommand so output stays consistent regardless of which
//! pipeline stage produced it.

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

/// Output format for CLI commands. Defaults to human-readable tables;
/// `json` emits the same data as a single `serde_json` value on stdout for
/// scripted callers.
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Create a table with the project's standard preset.
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table
}

/// Format a millisecond duration in human-readable form.
pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1_000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.2}s", ms as f64 / 1_000.0)
    } else {
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        format!("{minutes}m {seconds}s")
    }
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "ERROR:".bright_red().bold(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "WARNING:".bright_yellow().bold(), msg);
}

pub fn print_success(msg: &str) {
    println!("{} {}", "\u{2713}".bright_green().bold(), msg);
}

pub fn print_info(msg: &str) {
    println!("{} {}", "\u{2139}".bright_blue().bold(), msg);
}
