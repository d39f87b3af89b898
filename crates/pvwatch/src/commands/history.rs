//! `pvwatch history` / `pvwatch alarms` -- archived data queries.

use serde::Serialize;
use tabled::Tabled;

use pvwatch_core::{Monitor, PvName};

use crate::cli::{AlarmsArgs, GlobalOpts, HistoryArgs};
use crate::error::CliError;
use crate::output;

#[derive(Tabled, Serialize)]
struct HistoryRow {
    #[tabled(rename = "TIME")]
    time: String,
    #[tabled(rename = "VALUE")]
    value: f64,
}

#[derive(Tabled, Serialize)]
struct AlarmRow {
    #[tabled(rename = "TIME")]
    time: String,
    #[tabled(rename = "PV")]
    pv: String,
    #[tabled(rename = "SEVERITY")]
    severity: String,
    #[tabled(rename = "STATUS")]
    status: String,
}

pub async fn history(
    monitor: &Monitor,
    args: HistoryArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let pv = PvName::new(&args.pv).map_err(CliError::from)?;
    let points = monitor
        .pv_history(&pv, &args.range, args.aggregation.into(), &args.interval)
        .await?;

    let rows: Vec<HistoryRow> = points
        .iter()
        .map(|p| HistoryRow {
            time: p.time.to_rfc3339(),
            value: p.value,
        })
        .collect();
    output::render(&rows, &global.output)
}

pub async fn alarms(
    monitor: &Monitor,
    args: AlarmsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let events = monitor
        .alarm_history(&args.range, args.severity.as_deref())
        .await?;

    let rows: Vec<AlarmRow> = events
        .iter()
        .map(|e| AlarmRow {
            time: e.time.to_rfc3339(),
            pv: e.pv_name.clone(),
            severity: e.severity.clone(),
            status: e.status.clone().unwrap_or_default(),
        })
        .collect();
    output::render(&rows, &global.output)
}
