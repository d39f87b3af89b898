//! Profile loading and `MonitorConfig` resolution.
//!
//! Profiles live in a TOML file under the user config directory and are
//! merged with `PVWATCH_*` environment variables via figment. CLI flags
//! override both. Core never sees any of this -- it receives a plain
//! `MonitorConfig`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use pvwatch_core::MonitorConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// On-disk configuration: named profiles plus a default selection.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FileConfig {
    pub default_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

/// One gateway/history endpoint pair with optional timing overrides.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    pub gateway: String,
    pub history: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub heartbeat_secs: Option<u64>,
}

/// Path of the config file (`~/.config/pvwatch/config.toml` on Linux).
pub fn config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "pvwatch")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("pvwatch.toml"))
}

/// Load the config file merged with `PVWATCH_*` env overrides.
/// A missing file is not an error -- it yields the empty default.
pub fn load_config_or_default() -> FileConfig {
    Figment::new()
        .merge(Toml::file(config_path()))
        .merge(Env::prefixed("PVWATCH_CONFIG_"))
        .extract()
        .unwrap_or_default()
}

/// Build a `MonitorConfig` from the config file, profile, and CLI flags.
pub fn build_monitor_config(global: &GlobalOpts) -> Result<MonitorConfig, CliError> {
    let file = load_config_or_default();

    let profile = match global
        .profile
        .as_deref()
        .or(file.default_profile.as_deref())
    {
        Some(name) => Some(file.profiles.get(name).cloned().ok_or_else(|| {
            CliError::ProfileNotFound {
                name: name.to_owned(),
                available: file.profiles.keys().cloned().collect::<Vec<_>>().join(", "),
            }
        })?),
        None => None,
    };

    let gateway_raw = global
        .gateway
        .clone()
        .or_else(|| profile.as_ref().map(|p| p.gateway.clone()))
        .ok_or_else(|| CliError::NoGateway {
            path: config_path().display().to_string(),
        })?;

    let history_raw = global
        .history_url
        .clone()
        .or_else(|| profile.as_ref().and_then(|p| p.history.clone()));

    let mut config = MonitorConfig {
        gateway_url: parse_url("gateway", &gateway_raw)?,
        transport_timeout: Duration::from_secs(global.timeout),
        ..MonitorConfig::default()
    };
    if let Some(history) = history_raw {
        config.history_url = parse_url("history-url", &history)?;
    }
    if let Some(ms) = profile.as_ref().and_then(|p| p.poll_interval_ms) {
        config.poll_interval = Duration::from_millis(ms);
    }
    if let Some(secs) = profile.as_ref().and_then(|p| p.heartbeat_secs) {
        config.heartbeat_interval = Duration::from_secs(secs);
    }

    Ok(config)
}

fn parse_url(field: &str, raw: &str) -> Result<url::Url, CliError> {
    raw.parse().map_err(|_| CliError::Config {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}
