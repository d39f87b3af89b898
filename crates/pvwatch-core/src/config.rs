// ── Runtime monitor configuration ──
//
// Describes *how* to reach the gateway and history service and the timing
// of the background tasks. The CLI constructs a `MonitorConfig` and hands
// it in -- core never reads config files.

use std::time::Duration;

use url::Url;

/// Hard floor for the polling interval. Ticks faster than this would
/// outrun the gateway's own update cadence and pile up request load.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Configuration for a single monitor instance.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Gateway API root (e.g. `http://localhost:8080/api/epics`).
    pub gateway_url: Url,
    /// History service root (e.g. `http://localhost:3001/api`).
    pub history_url: Url,
    /// Transport-level timeout for every HTTP request.
    pub transport_timeout: Duration,
    /// How often to run the connection heartbeat.
    pub heartbeat_interval: Duration,
    /// Upper bound on a single heartbeat check.
    pub heartbeat_timeout: Duration,
    /// How often to poll subscribed PVs. Clamped to [`MIN_POLL_INTERVAL`].
    pub poll_interval: Duration,
    /// Per-PV bound on one value fetch within a poll cycle.
    pub fetch_timeout: Duration,
    /// Bound on a subscribe request.
    pub subscribe_timeout: Duration,
    /// Bound on a best-effort unsubscribe request.
    pub unsubscribe_timeout: Duration,
}

impl MonitorConfig {
    /// The effective polling interval after clamping.
    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://localhost:8080/api/epics"
                .parse()
                .expect("default gateway URL"),
            history_url: "http://localhost:3001/api"
                .parse()
                .expect("default history URL"),
            transport_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            fetch_timeout: Duration::from_secs(5),
            subscribe_timeout: Duration::from_secs(10),
            unsubscribe_timeout: Duration::from_secs(5),
        }
    }
}
