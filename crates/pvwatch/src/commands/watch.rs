//! `pvwatch watch` -- subscribe, poll continuously, print each cycle.

use serde::Serialize;
use tabled::Tabled;

use pvwatch_core::{Monitor, PvName, TimeWindow};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

#[derive(Tabled, Serialize)]
struct SampleRow {
    #[tabled(rename = "PV")]
    pv: String,
    #[tabled(rename = "VALUE")]
    value: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "ALARM")]
    alarm: String,
    #[tabled(rename = "TIMESTAMP")]
    timestamp: String,
}

pub async fn handle(
    monitor: &Monitor,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    monitor.start().await;
    if monitor.connection_state() != pvwatch_core::ConnectionState::Connected {
        return Err(CliError::NotConnected);
    }

    monitor.set_poll_interval(args.interval).await;
    monitor
        .set_window(TimeWindow::from_secs(args.window.as_secs()))
        .await?;
    if args.no_history {
        monitor.set_show_historical(false);
    }

    let mut selected = Vec::with_capacity(args.pvs.len());
    for raw in &args.pvs {
        selected.push(monitor.subscribe(raw, None).await?);
    }
    monitor.select_for_chart(&selected).await?;

    let mut samples_rx = monitor.watch_samples();
    let mut completed = 0u64;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted; shutting down");
                break;
            }
            changed = samples_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                completed += 1;
                render_cycle(monitor, &selected, global)?;
                if args.cycles.is_some_and(|n| completed >= n) {
                    break;
                }
            }
        }
    }

    if args.series {
        render_series(monitor)?;
    }

    monitor.shutdown().await;
    Ok(())
}

fn render_cycle(
    monitor: &Monitor,
    selected: &[PvName],
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let samples = monitor.samples();

    if matches!(global.output, OutputFormat::Json) {
        let cycle: Vec<_> = selected.iter().filter_map(|pv| samples.get(pv)).collect();
        return output::render_json(&cycle);
    }

    let table = monitor.table();
    let rows: Vec<SampleRow> = selected
        .iter()
        .map(|pv| SampleRow {
            pv: pv.to_string(),
            value: table.formatted_value(pv),
            status: output::status_cell(table.status_of(pv)),
            alarm: output::alarm_cell(table.alarm_level(pv)),
            timestamp: samples
                .get(pv)
                .map(|s| s.timestamp.to_rfc3339())
                .unwrap_or_else(|| "-".into()),
        })
        .collect();

    let stats = monitor.connection_stats();
    println!(
        "cycle {} -- {}/{} connected, {} alarmed, {} errors",
        monitor.cycles_completed(),
        stats.connected,
        stats.total,
        stats.with_alarms,
        stats.with_errors,
    );
    output::render(&rows, &global.output)
}

/// Dump the merged live+historical series on exit (`--series`).
fn render_series(monitor: &Monitor) -> Result<(), CliError> {
    let merged = monitor.merged_series();
    let (min, max) = monitor.scale_bounds();

    println!("merged series (y-scale {min:.2} .. {max:.2}):");
    for (pv, points) in &merged {
        let historical = points.iter().filter(|p| p.is_historical).count();
        println!(
            "  {pv}: {} points ({historical} historical, {} live)",
            points.len(),
            points.len() - historical,
        );
    }
    Ok(())
}
