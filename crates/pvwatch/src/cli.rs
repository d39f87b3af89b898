//! Clap derive structures for the `pvwatch` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// pvwatch -- monitor EPICS process variables from the command line
#[derive(Debug, Parser)]
#[command(
    name = "pvwatch",
    version,
    about = "Monitor EPICS PVs through an HTTP gateway",
    long_about = "Subscribe to process variables on an EPICS HTTP gateway, poll their\n\
        values in near-real time, and overlay archived history on the live data.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Profile from the config file to use
    #[arg(long, short = 'p', env = "PVWATCH_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Gateway API root URL (overrides profile)
    #[arg(long, short = 'g', env = "PVWATCH_GATEWAY", global = true)]
    pub gateway: Option<String>,

    /// History service root URL (overrides profile)
    #[arg(long, env = "PVWATCH_HISTORY", global = true)]
    pub history_url: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "PVWATCH_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Request timeout in seconds
    #[arg(long, env = "PVWATCH_TIMEOUT", default_value = "10", global = true)]
    pub timeout: u64,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show gateway health counters
    Health,

    /// List PVs currently subscribed on the gateway
    #[command(alias = "ls")]
    Pvs,

    /// Subscribe to one or more PVs
    #[command(alias = "sub")]
    Subscribe(SubscribeArgs),

    /// Unsubscribe from one or more PVs
    #[command(alias = "unsub")]
    Unsubscribe(UnsubscribeArgs),

    /// Poll PVs continuously and print each cycle
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Query archived history for a PV
    History(HistoryArgs),

    /// Query archived alarm transitions
    Alarms(AlarmsArgs),
}

#[derive(Debug, Args)]
pub struct SubscribeArgs {
    /// PV names to subscribe
    #[arg(required = true)]
    pub pvs: Vec<String>,

    /// Claim the PVs for a named group (rejects names owned elsewhere)
    #[arg(long)]
    pub group: Option<String>,
}

#[derive(Debug, Args)]
pub struct UnsubscribeArgs {
    /// PV names to unsubscribe
    #[arg(required = true)]
    pub pvs: Vec<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// PV names to watch (subscribed if not already)
    #[arg(required = true)]
    pub pvs: Vec<String>,

    /// Polling interval (e.g. "500ms", "2s"); floored at 500ms
    #[arg(long, short = 'i', default_value = "1s", value_parser = humantime::parse_duration)]
    pub interval: Duration,

    /// Live window retained for the merged series (e.g. "5m", "1h")
    #[arg(long, short = 'w', default_value = "5m", value_parser = humantime::parse_duration)]
    pub window: Duration,

    /// Skip the historical overlay
    #[arg(long)]
    pub no_history: bool,

    /// Exit after this many completed poll cycles
    #[arg(long)]
    pub cycles: Option<u64>,

    /// Print the merged chart series on exit
    #[arg(long)]
    pub series: bool,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// PV name
    pub pv: String,

    /// Time range shorthand understood by the history service
    #[arg(long, short = 'r', default_value = "1h")]
    pub range: String,

    /// Aggregation applied per bucket
    #[arg(long, short = 'a', default_value = "mean")]
    pub aggregation: AggregationArg,

    /// Bucket width
    #[arg(long, short = 'i', default_value = "1m")]
    pub interval: String,
}

#[derive(Debug, Args)]
pub struct AlarmsArgs {
    /// Time range shorthand understood by the history service
    #[arg(long, short = 'r', default_value = "24h")]
    pub range: String,

    /// Only transitions at this severity (e.g. MAJOR, MINOR)
    #[arg(long, short = 's')]
    pub severity: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AggregationArg {
    Mean,
    Min,
    Max,
    Last,
}

impl From<AggregationArg> for pvwatch_api::Aggregation {
    fn from(arg: AggregationArg) -> Self {
        match arg {
            AggregationArg::Mean => Self::Mean,
            AggregationArg::Min => Self::Min,
            AggregationArg::Max => Self::Max,
            AggregationArg::Last => Self::Last,
        }
    }
}
