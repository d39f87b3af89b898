//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` variants into user-facing errors with actionable help
//! text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use pvwatch_core::CoreError;

/// Exit codes, stable for scripting.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_CONNECTED: i32 = 3;
    pub const CONFLICT: i32 = 4;
    pub const CONNECTION: i32 = 5;
    pub const TIMEOUT: i32 = 6;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the gateway")]
    #[diagnostic(
        code(pvwatch::unreachable),
        help(
            "Check that the gateway is running and the URL is right.\n\
             Reason: {reason}"
        )
    )]
    Unreachable { reason: String },

    #[error("Not connected to the gateway")]
    #[diagnostic(
        code(pvwatch::not_connected),
        help("The gateway did not answer the connection check. Verify --gateway or your profile.")
    )]
    NotConnected,

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(pvwatch::timeout),
        help("Increase --timeout or check gateway responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── Domain ───────────────────────────────────────────────────────
    #[error("Invalid PV name {name:?}: {reason}")]
    #[diagnostic(code(pvwatch::validation))]
    Validation { name: String, reason: String },

    #[error("PV '{pv}' already belongs to group '{group}'")]
    #[diagnostic(
        code(pvwatch::duplicate),
        help("A PV can belong to at most one group. Unsubscribe it first or use that group.")
    )]
    Duplicate { pv: String, group: String },

    #[error("Gateway error (HTTP {status}): {message}")]
    #[diagnostic(code(pvwatch::gateway))]
    Gateway { status: u16, message: String },

    #[error("{message}")]
    #[diagnostic(code(pvwatch::api))]
    Api { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("No gateway URL configured")]
    #[diagnostic(
        code(pvwatch::no_gateway),
        help(
            "Pass --gateway, set PVWATCH_GATEWAY, or add a profile to {path}."
        )
    )]
    NoGateway { path: String },

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(code(pvwatch::profile_not_found), help("Available profiles: {available}"))]
    ProfileNotFound { name: String, available: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(pvwatch::config))]
    Config { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(pvwatch::config_file))]
    ConfigFile(Box<figment::Error>),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(pvwatch::json))]
    Json(#[from] serde_json::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::ConfigFile(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unreachable { .. } | Self::Gateway { .. } => exit_code::CONNECTION,
            Self::NotConnected => exit_code::NOT_CONNECTED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Duplicate { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::Config { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation { name, reason } => CliError::Validation { name, reason },
            CoreError::NotConnected => CliError::NotConnected,
            CoreError::DuplicatePv { pv, existing_group } => CliError::Duplicate {
                pv,
                group: existing_group,
            },
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Http { status, message } => CliError::Gateway { status, message },
            CoreError::Unreachable { reason } => CliError::Unreachable { reason },
            CoreError::Parse { message } | CoreError::History { message } => {
                CliError::Api { message }
            }
            CoreError::Config { message } => CliError::Config {
                field: "config".into(),
                reason: message,
            },
        }
    }
}
