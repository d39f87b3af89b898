// ── Canonical sample records ──
//
// PvSample is the normalized form of one gateway reading; ErrorRecord is
// its failure counterpart. Both are immutable: each poll cycle replaces
// them wholesale rather than patching fields.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;

use super::PvName;
use crate::error::CoreError;

/// One normalized reading of a PV.
#[derive(Debug, Clone, Serialize)]
pub struct PvSample {
    pub pv: PvName,
    /// Gateway-side update time when available, otherwise the poll time.
    pub timestamp: DateTime<Utc>,
    /// The value exactly as the gateway sent it (number, string, or null).
    pub raw_value: serde_json::Value,
    /// Numeric coercion of `raw_value`; `None` for non-numeric records.
    pub numeric_value: Option<f64>,
    pub formatted_value: String,
    pub units: String,
    pub connection_status: String,
    pub is_connected: bool,
    pub has_alarm: bool,
    pub alarm_severity: String,
    pub alarm_status: String,
    pub data_type: String,
    pub precision: u32,
}

impl PvSample {
    /// Synthetic sample installed when a poll for this PV fails, so
    /// consumers degrade to an explicit error state instead of showing a
    /// stale value indefinitely.
    pub fn error_placeholder(pv: PvName, at: DateTime<Utc>) -> Self {
        Self {
            pv,
            timestamp: at,
            raw_value: serde_json::Value::String("Error".into()),
            numeric_value: None,
            formatted_value: "Error".into(),
            units: String::new(),
            connection_status: "ERROR".into(),
            is_connected: false,
            has_alarm: false,
            alarm_severity: crate::normalize::NO_ALARM_SENTINEL.into(),
            alarm_status: crate::normalize::NO_ALARM_SENTINEL.into(),
            data_type: String::new(),
            precision: 0,
        }
    }

    /// Value with units suffix, for display (`"42.50 degC"`, `"N/A"`).
    pub fn display_value(&self) -> String {
        if self.units.is_empty() {
            self.formatted_value.clone()
        } else {
            format!("{} {}", self.formatted_value, self.units)
        }
    }

    /// Coarse alarm classification derived from the severity string.
    pub fn alarm_level(&self) -> AlarmLevel {
        if !self.has_alarm {
            return AlarmLevel::None;
        }
        let severity = self.alarm_severity.to_lowercase();
        if severity.contains("major") || severity.contains("high") {
            AlarmLevel::Major
        } else {
            // Anything alarmed but not major is treated as minor.
            AlarmLevel::Minor
        }
    }
}

/// Coarse alarm classification for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum AlarmLevel {
    None,
    Minor,
    Major,
}

/// Per-PV status derived from the sample and error tables.
///
/// Precedence (highest first): Error, Unknown, Alarm, Disconnected,
/// Connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum PvStatus {
    Connected,
    Disconnected,
    Alarm,
    Error,
    Unknown,
}

/// Why the most recent poll for a PV failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Http,
    Connection,
    Parse,
}

impl ErrorKind {
    /// Classify a core error into a record kind.
    pub fn of(err: &CoreError) -> Self {
        match err {
            CoreError::Timeout { .. } => Self::Timeout,
            CoreError::Http { .. } => Self::Http,
            CoreError::Parse { .. } => Self::Parse,
            _ => Self::Connection,
        }
    }
}

/// Failure record for a PV whose most recent poll did not produce a
/// sample. Exists only until the PV's next successful poll.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub pv: PvName,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ErrorKind,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample(severity: &str, has_alarm: bool) -> PvSample {
        PvSample {
            pv: PvName::new("DEV:TEMP").unwrap(),
            timestamp: Utc::now(),
            raw_value: serde_json::json!(1.0),
            numeric_value: Some(1.0),
            formatted_value: "1.0".into(),
            units: "V".into(),
            connection_status: "CONNECTED".into(),
            is_connected: true,
            has_alarm,
            alarm_severity: severity.into(),
            alarm_status: severity.into(),
            data_type: "Double".into(),
            precision: 1,
        }
    }

    #[test]
    fn display_value_appends_units() {
        assert_eq!(sample("NO_ALARM", false).display_value(), "1.0 V");
    }

    #[test]
    fn alarm_level_classification() {
        assert_eq!(sample("NO_ALARM", false).alarm_level(), AlarmLevel::None);
        assert_eq!(sample("MINOR", true).alarm_level(), AlarmLevel::Minor);
        assert_eq!(sample("MAJOR", true).alarm_level(), AlarmLevel::Major);
        assert_eq!(sample("HIHI_HIGH", true).alarm_level(), AlarmLevel::Major);
        // Unrecognized severities on an alarmed PV default to minor.
        assert_eq!(sample("INVALID", true).alarm_level(), AlarmLevel::Minor);
    }

    #[test]
    fn error_placeholder_is_disconnected_and_alarm_free() {
        let placeholder =
            PvSample::error_placeholder(PvName::new("DEV:TEMP").unwrap(), Utc::now());
        assert!(!placeholder.is_connected);
        assert!(!placeholder.has_alarm);
        assert_eq!(placeholder.formatted_value, "Error");
        assert_eq!(placeholder.numeric_value, None);
    }
}
