//! `pvwatch pvs` -- list the gateway's subscribed PVs.

use serde::Serialize;
use tabled::Tabled;

use pvwatch_core::Monitor;

use crate::cli::GlobalOpts;
use crate::commands::require_connected;
use crate::error::CliError;
use crate::output;

#[derive(Tabled, Serialize)]
struct PvRow {
    #[tabled(rename = "PV")]
    pv: String,
    #[tabled(rename = "GROUP")]
    group: String,
}

pub async fn handle(monitor: &Monitor, global: &GlobalOpts) -> Result<(), CliError> {
    // The connection check doubles as the fetch: it reconciles the local
    // set from the gateway's authoritative list.
    require_connected(monitor).await?;

    let membership = monitor.group_membership();
    let rows: Vec<PvRow> = monitor
        .subscriptions()
        .iter()
        .map(|pv| PvRow {
            pv: pv.to_string(),
            group: membership.get(pv).cloned().unwrap_or_default(),
        })
        .collect();

    output::render(&rows, &global.output)
}
