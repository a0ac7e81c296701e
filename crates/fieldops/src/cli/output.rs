//! Table and JSON output shared by the subcommands.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Row, Table};
use fieldops_filters::ApplyStatus;
use serde::Serialize;

const DISPLAY_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

/// Rows may be plain strings or styled [`Cell`]s.
pub fn print_table<R: Into<Row>>(headers: &[&str], rows: Vec<R>) {
    println!("{}", build_table(headers, rows));
}

pub fn build_table<R: Into<Row>>(headers: &[&str], rows: Vec<R>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    for row in rows {
        table.add_row(row);
    }
    table
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

/// An open bound prints as `open`.
pub fn format_bound(value: Option<NaiveDateTime>) -> String {
    match value {
        Some(value) => value.format(DISPLAY_DATETIME).to_string(),
        None => "open".to_string(),
    }
}

pub fn status_cell(status: ApplyStatus) -> Cell {
    let color = match status {
        ApplyStatus::Idle => Color::Grey,
        ApplyStatus::Dirty => Color::Yellow,
        ApplyStatus::Applying => Color::Blue,
        ApplyStatus::Applied => Color::Green,
        ApplyStatus::Error => Color::Red,
    };
    Cell::new(status.as_str()).fg(color)
}
