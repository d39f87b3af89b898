// Wire types for the gateway and history APIs.
//
// These mirror the JSON payloads exactly; canonicalization (sentinel
// comparison, numeric coercion) happens in pvwatch-core's normalizer.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Gateway payloads ────────────────────────────────────────────────

/// Raw per-PV reading from `GET /pv/{pv}`.
///
/// Every field except `value` is optional in practice: the gateway omits
/// metadata for PVs it has not fully resolved yet. The value itself may be
/// a number, a string, or null depending on the record's data type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPvReading {
    #[serde(default)]
    pub value: serde_json::Value,
    pub connection_status: Option<String>,
    pub alarm_severity: Option<String>,
    pub alarm_status: Option<String>,
    pub data_type: Option<String>,
    pub units: Option<String>,
    pub precision: Option<u32>,
    pub formatted_value: Option<String>,
    /// Gateway-side timestamp of the last value update (RFC 3339).
    pub last_update: Option<DateTime<Utc>>,
}

/// Gateway health summary from `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayHealth {
    pub status: String,
    #[serde(rename = "totalPVs", default)]
    pub total_pvs: u64,
    #[serde(rename = "connectedPVs", default)]
    pub connected_pvs: u64,
    #[serde(rename = "alarmedPVs", default)]
    pub alarmed_pvs: u64,
    pub timestamp: Option<DateTime<Utc>>,
}

// ── History payloads ────────────────────────────────────────────────

/// The `{success, data, error}` envelope every history endpoint uses.
#[derive(Debug, Deserialize)]
pub(crate) struct HistoryEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// One aggregated bucket of a PV's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub time: DateTime<Utc>,
    pub value: f64,
}

/// Batched history response: PV name -> bucketed points.
pub type MultiPvHistory = HashMap<String, Vec<HistoryPoint>>;

/// An alarm transition recorded by the archiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmEvent {
    pub pv_name: String,
    pub severity: String,
    pub status: Option<String>,
    pub time: DateTime<Utc>,
}

/// Server-side aggregation applied to each history bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregation {
    #[default]
    Mean,
    Min,
    Max,
    Last,
}

impl Aggregation {
    /// Query-parameter spelling expected by the history service.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::Last => "last",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
