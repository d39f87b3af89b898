// History service HTTP client
//
// The history service fronts the archive database and returns bucketed
// aggregates wrapped in a `{success, data, error}` envelope. All methods
// unwrap the envelope: `success: false` becomes `Error::History`.

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;
use crate::types::{Aggregation, AlarmEvent, HistoryEnvelope, HistoryPoint, MultiPvHistory};

/// Raw HTTP client for the history/archiver service.
#[derive(Debug, Clone)]
pub struct HistoryClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HistoryClient {
    /// Create a new history client from a `TransportConfig`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a history client with a pre-built `reqwest::Client`.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let base_url = Url::parse(base_url)?;
        Ok(Self { http, base_url })
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /history/pv/{pv}` — bucketed aggregates for a single PV.
    ///
    /// `time_range` uses the service's shorthand (`"300s"`, `"1h"`, `"24h"`),
    /// `interval` the bucket width (`"10s"`, `"1m"`).
    pub async fn pv_history(
        &self,
        pv: &str,
        time_range: &str,
        aggregation: Aggregation,
        interval: &str,
    ) -> Result<Vec<HistoryPoint>, Error> {
        let mut url = self.endpoint(&["history", "pv", pv]);
        url.query_pairs_mut()
            .append_pair("timeRange", time_range)
            .append_pair("aggregation", aggregation.as_str())
            .append_pair("interval", interval);

        let points = self.get_enveloped(url).await?;
        Ok(points)
    }

    /// `GET /history/multiple` — bucketed aggregates for several PVs at once.
    ///
    /// Returns a map keyed by PV name; PVs with no archived data are
    /// absent from the map rather than mapped to an empty vec.
    pub async fn multiple_pv_history(
        &self,
        pvs: &[String],
        time_range: &str,
        aggregation: Aggregation,
        interval: &str,
    ) -> Result<MultiPvHistory, Error> {
        let mut url = self.endpoint(&["history", "multiple"]);
        {
            let mut query = url.query_pairs_mut();
            for pv in pvs {
                query.append_pair("pvNames", pv);
            }
            query
                .append_pair("timeRange", time_range)
                .append_pair("aggregation", aggregation.as_str())
                .append_pair("interval", interval);
        }

        self.get_enveloped(url).await
    }

    /// `GET /history/alarms` — alarm transitions in the given range,
    /// optionally filtered by severity.
    pub async fn alarm_history(
        &self,
        time_range: &str,
        severity: Option<&str>,
    ) -> Result<Vec<AlarmEvent>, Error> {
        let mut url = self.endpoint(&["history", "alarms"]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("timeRange", time_range);
            if let Some(sev) = severity {
                query.append_pair("severity", sev);
            }
        }

        self.get_enveloped(url).await
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .expect("history base URL cannot be a base")
            .pop_if_empty()
            .extend(segments);
        url
    }

    /// Send a GET request, unwrap the `{success, data, error}` envelope.
    async fn get_enveloped<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            return Err(Error::Gateway {
                status: status.as_u16(),
                message: body,
            });
        }

        let envelope: HistoryEnvelope<T> =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;

        if !envelope.success {
            return Err(Error::History {
                message: envelope
                    .error
                    .unwrap_or_else(|| "history service reported failure".into()),
            });
        }

        envelope.data.ok_or_else(|| Error::Deserialization {
            message: "success response missing `data` field".into(),
            body,
        })
    }
}
