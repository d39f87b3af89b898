//! `pvwatch health` -- gateway-wide counters.

use serde::Serialize;
use tabled::Tabled;

use pvwatch_core::Monitor;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

#[derive(Tabled, Serialize)]
struct HealthRow {
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "TOTAL")]
    total: u64,
    #[tabled(rename = "CONNECTED")]
    connected: u64,
    #[tabled(rename = "ALARMED")]
    alarmed: u64,
    #[tabled(rename = "TIMESTAMP")]
    timestamp: String,
}

pub async fn handle(monitor: &Monitor, global: &GlobalOpts) -> Result<(), CliError> {
    let health = monitor.health().await?;

    if matches!(global.output, OutputFormat::Json) {
        return output::render_json(&health);
    }

    let row = HealthRow {
        status: health.status,
        total: health.total_pvs,
        connected: health.connected_pvs,
        alarmed: health.alarmed_pvs,
        timestamp: health
            .timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".into()),
    };
    output::render(&[row], &global.output)
}
