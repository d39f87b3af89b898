//! Command dispatch: builds a `Monitor` from the resolved config and
//! routes each subcommand to its handler.

mod health;
mod history;
mod pvs;
mod subscribe;
mod watch;

use pvwatch_core::Monitor;

use crate::cli::{Cli, Command};
use crate::config;
use crate::error::CliError;

pub async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let monitor_config = config::build_monitor_config(&cli.global)?;
    let monitor = Monitor::new(monitor_config)?;
    tracing::debug!(command = ?cli.command, "dispatching command");

    match cli.command {
        Command::Health => health::handle(&monitor, &cli.global).await,
        Command::Pvs => pvs::handle(&monitor, &cli.global).await,
        Command::Subscribe(args) => subscribe::subscribe(&monitor, args, &cli.global).await,
        Command::Unsubscribe(args) => subscribe::unsubscribe(&monitor, args).await,
        Command::Watch(args) => watch::handle(&monitor, args, &cli.global).await,
        Command::History(args) => history::history(&monitor, args, &cli.global).await,
        Command::Alarms(args) => history::alarms(&monitor, args, &cli.global).await,
    }
}

/// Run the connection check once and fail fast if the gateway is down.
pub(crate) async fn require_connected(monitor: &Monitor) -> Result<(), CliError> {
    if monitor.check_connection().await {
        Ok(())
    } else {
        Err(CliError::NotConnected)
    }
}
