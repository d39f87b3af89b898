//! `pvwatch subscribe` / `pvwatch unsubscribe`.

use owo_colors::OwoColorize;

use pvwatch_core::Monitor;

use crate::cli::{GlobalOpts, SubscribeArgs, UnsubscribeArgs};
use crate::commands::require_connected;
use crate::error::CliError;
use crate::output;

pub async fn subscribe(
    monitor: &Monitor,
    args: SubscribeArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    require_connected(monitor).await?;

    // Batched path when a group is claimed: per-name outcomes, one commit.
    if let Some(group) = args.group.as_deref() {
        let report = monitor.bulk_subscribe(group, &args.pvs).await?;
        if matches!(global.output, crate::cli::OutputFormat::Json) {
            return output::render_json(&report);
        }
        println!("{}", report.summary());
        return Ok(());
    }

    for raw in &args.pvs {
        match monitor.subscribe(raw, None).await {
            Ok(pv) => println!("{} {}", "subscribed".green(), pv),
            Err(err) => {
                let err = CliError::from(err);
                println!("{} {}: {}", "failed".red(), raw, err);
            }
        }
    }
    Ok(())
}

pub async fn unsubscribe(monitor: &Monitor, args: UnsubscribeArgs) -> Result<(), CliError> {
    // No connection gate: local removal is unconditional and the network
    // call is best-effort.
    for raw in &args.pvs {
        monitor.unsubscribe(raw).await?;
        println!("{} {}", "unsubscribed".green(), raw.trim());
    }
    Ok(())
}
