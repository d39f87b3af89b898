// ── Payload normalization ──
//
// Pure mapping from a raw gateway reading to a canonical PvSample.
// All sentinel comparison and numeric coercion happens here, once, so the
// rest of the crate only ever sees canonical records.

use chrono::{DateTime, Utc};
use pvwatch_api::RawPvReading;

use crate::model::{PvName, PvSample};

/// The single value of the gateway's `connectionStatus` field that means
/// the PV's channel is live. Any other value (or its absence) is treated
/// as not connected.
pub const CONNECTED_SENTINEL: &str = "CONNECTED";

/// The single value of `alarmSeverity` that means "no alarm". A PV is
/// alarmed iff the field is present and differs from this.
pub const NO_ALARM_SENTINEL: &str = "NO_ALARM";

/// Shown when the gateway provides neither a formatted nor a raw value.
const MISSING_VALUE: &str = "N/A";

/// Normalize one raw reading into a canonical sample.
///
/// Never fails: a payload with a non-numeric value yields a sample with
/// `numeric_value: None` rather than an error, and missing metadata
/// collapses to defaults.
pub fn normalize(pv: &PvName, raw: RawPvReading, polled_at: DateTime<Utc>) -> PvSample {
    let connection_status = raw.connection_status.unwrap_or_else(|| "UNKNOWN".into());
    let is_connected = connection_status == CONNECTED_SENTINEL;

    let has_alarm = raw
        .alarm_severity
        .as_deref()
        .is_some_and(|sev| sev != NO_ALARM_SENTINEL);
    let alarm_severity = raw
        .alarm_severity
        .unwrap_or_else(|| NO_ALARM_SENTINEL.into());
    let alarm_status = raw.alarm_status.unwrap_or_else(|| NO_ALARM_SENTINEL.into());

    let numeric_value = coerce_numeric(&raw.value);
    let formatted_value = raw
        .formatted_value
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| render_raw(&raw.value));

    PvSample {
        pv: pv.clone(),
        timestamp: raw.last_update.unwrap_or(polled_at),
        raw_value: raw.value,
        numeric_value,
        formatted_value,
        units: raw.units.unwrap_or_default(),
        connection_status,
        is_connected,
        has_alarm,
        alarm_severity,
        alarm_status,
        data_type: raw.data_type.unwrap_or_default(),
        precision: raw.precision.unwrap_or(0),
    }
}

/// Best-effort numeric coercion: JSON numbers directly, strings via
/// `f64` parse, everything else `None`.
fn coerce_numeric(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Bool(b) => Some(f64::from(u8::from(*b))),
        _ => None,
    }
}

/// Render the raw JSON value for display when no formatted value exists.
fn render_raw(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => MISSING_VALUE.into(),
        serde_json::Value::String(s) if s.is_empty() => MISSING_VALUE.into(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pv() -> PvName {
        PvName::new("DEV:TEMP").unwrap()
    }

    fn raw(body: serde_json::Value) -> RawPvReading {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn connected_sentinel_is_exact_match() {
        let now = Utc::now();
        for (status, expected) in [
            ("CONNECTED", true),
            ("DISCONNECTED", false),
            ("connected", false),
            ("UNKNOWN", false),
        ] {
            let sample = normalize(&pv(), raw(json!({ "value": 1, "connectionStatus": status })), now);
            assert_eq!(sample.is_connected, expected, "status {status}");
        }
    }

    #[test]
    fn missing_status_means_not_connected() {
        let sample = normalize(&pv(), raw(json!({ "value": 1 })), Utc::now());
        assert!(!sample.is_connected);
        assert_eq!(sample.connection_status, "UNKNOWN");
    }

    #[test]
    fn alarm_requires_present_non_sentinel_severity() {
        let now = Utc::now();
        let alarmed = normalize(
            &pv(),
            raw(json!({ "value": 1, "alarmSeverity": "MAJOR" })),
            now,
        );
        assert!(alarmed.has_alarm);

        let quiet = normalize(
            &pv(),
            raw(json!({ "value": 1, "alarmSeverity": "NO_ALARM" })),
            now,
        );
        assert!(!quiet.has_alarm);

        // Absent severity is not an alarm.
        let unknown = normalize(&pv(), raw(json!({ "value": 1 })), now);
        assert!(!unknown.has_alarm);
        assert_eq!(unknown.alarm_severity, NO_ALARM_SENTINEL);
    }

    #[test]
    fn numeric_coercion_from_number_and_string() {
        let now = Utc::now();
        let from_number = normalize(&pv(), raw(json!({ "value": 42.5 })), now);
        assert_eq!(from_number.numeric_value, Some(42.5));

        let from_string = normalize(&pv(), raw(json!({ "value": " 3.25 " })), now);
        assert_eq!(from_string.numeric_value, Some(3.25));
    }

    #[test]
    fn non_numeric_value_is_retained_not_rejected() {
        let sample = normalize(&pv(), raw(json!({ "value": "OPEN" })), Utc::now());
        assert_eq!(sample.numeric_value, None);
        assert_eq!(sample.raw_value, json!("OPEN"));
        assert_eq!(sample.formatted_value, "OPEN");
    }

    #[test]
    fn formatted_value_fallback_chain() {
        let now = Utc::now();
        let with_formatted = normalize(
            &pv(),
            raw(json!({ "value": 42.5, "formattedValue": "42.50" })),
            now,
        );
        assert_eq!(with_formatted.formatted_value, "42.50");

        let from_raw = normalize(&pv(), raw(json!({ "value": 42.5 })), now);
        assert_eq!(from_raw.formatted_value, "42.5");

        let missing = normalize(&pv(), raw(json!({ "value": null })), now);
        assert_eq!(missing.formatted_value, "N/A");
    }

    #[test]
    fn timestamp_prefers_gateway_last_update() {
        let polled_at = Utc::now();
        let sample = normalize(
            &pv(),
            raw(json!({ "value": 1, "lastUpdate": "2026-08-06T10:00:00Z" })),
            polled_at,
        );
        assert_eq!(
            sample.timestamp,
            "2026-08-06T10:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );

        let fallback = normalize(&pv(), raw(json!({ "value": 1 })), polled_at);
        assert_eq!(fallback.timestamp, polled_at);
    }
}
