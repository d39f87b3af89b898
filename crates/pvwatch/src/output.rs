//! Table and JSON rendering for command output.

use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use pvwatch_core::{AlarmLevel, PvStatus};

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Print a slice of rows as a styled table or as JSON, per `-o`.
pub fn render<T: Tabled + Serialize>(rows: &[T], format: &OutputFormat) -> Result<(), CliError> {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("(no results)");
            } else {
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
    }
    Ok(())
}

/// Print any serializable value as pretty JSON.
pub fn render_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Colorized status cell.
pub fn status_cell(status: PvStatus) -> String {
    match status {
        PvStatus::Connected => status.to_string().green().to_string(),
        PvStatus::Alarm => status.to_string().yellow().to_string(),
        PvStatus::Error | PvStatus::Disconnected => status.to_string().red().to_string(),
        PvStatus::Unknown => status.to_string().dimmed().to_string(),
    }
}

/// Colorized alarm cell (empty for no alarm).
pub fn alarm_cell(level: AlarmLevel) -> String {
    match level {
        AlarmLevel::None => String::new(),
        AlarmLevel::Minor => level.to_string().yellow().to_string(),
        AlarmLevel::Major => level.to_string().red().bold().to_string(),
    }
}
