// Gateway HTTP client
//
// Wraps `reqwest::Client` with gateway-specific URL construction and
// response handling. The gateway speaks plain REST: bodies are bare JSON
// (no envelope), and failures are reported through HTTP status codes.

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;
use crate::types::{GatewayHealth, RawPvReading};

/// Raw HTTP client for the EPICS gateway.
///
/// `base_url` points at the gateway's API root (e.g.
/// `http://localhost:8080/api/epics`). PV names are inserted as single
/// path segments, so names containing `{}` or other reserved characters
/// are percent-encoded automatically.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: Url,
}

impl GatewayClient {
    /// Create a new gateway client from a `TransportConfig`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a gateway client with a pre-built `reqwest::Client`.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let base_url = Url::parse(base_url)?;
        Ok(Self { http, base_url })
    }

    /// The gateway base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /pvs` — list of PV names the gateway currently has subscribed.
    ///
    /// Doubles as the liveness probe: a successful response means the
    /// gateway is reachable, and the body is the authoritative
    /// subscription list for reconciliation.
    pub async fn list_pvs(&self) -> Result<Vec<String>, Error> {
        let url = self.endpoint(&["pvs"]);
        self.get_json(url).await
    }

    /// `POST /subscribe/{pv}` — ask the gateway to start monitoring a PV.
    pub async fn subscribe(&self, pv: &str) -> Result<(), Error> {
        let url = self.endpoint(&["subscribe", pv]);
        debug!("POST {}", url);

        let resp = self.http.post(url).send().await.map_err(Error::Transport)?;
        Self::check_status(resp).await.map(drop)
    }

    /// `DELETE /unsubscribe/{pv}` — stop monitoring a PV.
    pub async fn unsubscribe(&self, pv: &str) -> Result<(), Error> {
        let url = self.endpoint(&["unsubscribe", pv]);
        debug!("DELETE {}", url);

        let resp = self
            .http
            .delete(url)
            .send()
            .await
            .map_err(Error::Transport)?;
        Self::check_status(resp).await.map(drop)
    }

    /// `GET /pv/{pv}` — current raw reading for a subscribed PV.
    pub async fn read_pv(&self, pv: &str) -> Result<RawPvReading, Error> {
        let url = self.endpoint(&["pv", pv]);
        self.get_json(url).await
    }

    /// `GET /health` — gateway-wide connection and alarm counters.
    pub async fn health(&self) -> Result<GatewayHealth, Error> {
        let url = self.endpoint(&["health"]);
        self.get_json(url).await
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Build a URL by appending percent-encoded path segments to the base.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .expect("gateway base URL cannot be a base")
            .pop_if_empty()
            .extend(segments);
        url
    }

    /// Send a GET request and deserialize the JSON body.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        let resp = Self::check_status(resp).await?;

        let body = resp.text().await.map_err(Error::Transport)?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    /// Map non-2xx responses to `Error::Gateway`, keeping the body text.
    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let message = resp.text().await.unwrap_or_default();
        Err(Error::Gateway {
            status: status.as_u16(),
            message: if message.is_empty() {
                status.to_string()
            } else {
                message
            },
        })
    }
}
