// ── Core error types ──
//
// User-facing errors from pvwatch-core. These are NOT transport-specific --
// consumers never see reqwest errors or JSON parse failures directly.
// The `From<pvwatch_api::Error>` impl translates transport-layer errors
// into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Pre-network rejections (detected synchronously) ──────────────
    #[error("Invalid PV name {name:?}: {reason}")]
    Validation { name: String, reason: String },

    #[error("Not connected to the gateway")]
    NotConnected,

    #[error("PV '{pv}' already belongs to group '{existing_group}'")]
    DuplicatePv { pv: String, existing_group: String },

    // ── Network failures ─────────────────────────────────────────────
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Gateway returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Cannot reach gateway: {reason}")]
    Unreachable { reason: String },

    // ── Data failures ────────────────────────────────────────────────
    #[error("Malformed response: {message}")]
    Parse { message: String },

    #[error("History query failed: {message}")]
    History { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Returns `true` if the error indicates the gateway link itself is
    /// broken (as opposed to a per-PV or per-request failure).
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Unreachable { .. } | Self::NotConnected
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<pvwatch_api::Error> for CoreError {
    fn from(err: pvwatch_api::Error) -> Self {
        match err {
            pvwatch_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if let Some(status) = e.status() {
                    CoreError::Http {
                        status: status.as_u16(),
                        message: e.to_string(),
                    }
                } else {
                    CoreError::Unreachable {
                        reason: e.to_string(),
                    }
                }
            }
            pvwatch_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid URL: {e}"),
            },
            pvwatch_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            pvwatch_api::Error::Gateway { status, message } => CoreError::Http { status, message },
            pvwatch_api::Error::History { message } => CoreError::History { message },
            pvwatch_api::Error::Deserialization { message, .. } => CoreError::Parse { message },
        }
    }
}
