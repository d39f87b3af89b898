// ── Monitor abstraction ──
//
// Full lifecycle management for a gateway connection. Owns the
// subscription registry, the sample table, the series store, and the
// background tasks (heartbeat and poller). All subscription and
// connection state is mutated here and nowhere else; consumers read
// committed snapshots.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pvwatch_api::{
    Aggregation, AlarmEvent, GatewayClient, GatewayHealth, HistoryClient, HistoryPoint,
    TransportConfig,
};

use crate::config::{MonitorConfig, MIN_POLL_INTERVAL};
use crate::error::CoreError;
use crate::model::{ErrorRecord, PvName, PvSample};
use crate::poller;
use crate::registry::{BulkSubscribeReport, SubscriptionRegistry};
use crate::series::{ScaleMode, SeriesPoint, SeriesStore, TimeWindow};
use crate::store::{ConnectionStats, SampleTable};

// ── ConnectionState ──────────────────────────────────────────────

/// Gateway link state observable by consumers.
///
/// `Disconnected` means the gateway could not be reached at all;
/// `Error` means it answered with a non-2xx response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Checking,
    Connected,
    Disconnected,
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Checking => "Checking",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Error => "Error",
        };
        f.write_str(s)
    }
}

// ── Monitor ──────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<MonitorInner>`. Manages the full
/// lifecycle: connection heartbeat, subscription management, value
/// polling, and series merging.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

pub(crate) struct MonitorInner {
    pub(crate) config: MonitorConfig,
    pub(crate) gateway: GatewayClient,
    pub(crate) history: HistoryClient,
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) samples: SampleTable,
    pub(crate) series: StdMutex<SeriesStore>,
    pub(crate) connection_state: watch::Sender<ConnectionState>,
    /// Supersede token for the in-flight heartbeat check.
    check_cancel: StdMutex<CancellationToken>,
    /// Supersede token for the in-flight poll cycle's fan-out.
    pub(crate) cycle_cancel: StdMutex<CancellationToken>,
    /// Held for the duration of one poll cycle; `try_lock` failure means
    /// a cycle is in flight and the tick is dropped.
    pub(crate) cycle_gate: Mutex<()>,
    pub(crate) cycles_completed: AtomicU64,
    poll_interval: StdMutex<Duration>,
    /// Cancels the currently running poller task (superseded on interval
    /// change).
    poller_cancel: StdMutex<CancellationToken>,
    /// Root token: cancelling it stops every background task.
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Monitor {
    /// Create a new Monitor from configuration. Does NOT contact the
    /// gateway -- call [`start()`](Self::start) to begin the heartbeat
    /// and polling tasks.
    pub fn new(config: MonitorConfig) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            timeout: config.transport_timeout,
        };
        let gateway = GatewayClient::new(config.gateway_url.clone(), &transport)?;
        let history = HistoryClient::new(config.history_url.clone(), &transport)?;
        let (connection_state, _) = watch::channel(ConnectionState::Checking);
        let cancel = CancellationToken::new();
        let poll_interval = config.poll_interval;

        Ok(Self {
            inner: Arc::new(MonitorInner {
                config,
                gateway,
                history,
                registry: SubscriptionRegistry::new(),
                samples: SampleTable::new(),
                series: StdMutex::new(SeriesStore::default()),
                connection_state,
                check_cancel: StdMutex::new(CancellationToken::new()),
                cycle_cancel: StdMutex::new(CancellationToken::new()),
                cycle_gate: Mutex::new(()),
                cycles_completed: AtomicU64::new(0),
                poll_interval: StdMutex::new(poll_interval),
                poller_cancel: StdMutex::new(CancellationToken::new()),
                cancel,
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub(crate) fn inner(&self) -> &MonitorInner {
        &self.inner
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Run an initial connection check and spawn the background tasks.
    ///
    /// Never fails on an unreachable gateway: the heartbeat keeps
    /// retrying and the state machine reports the outage.
    pub async fn start(&self) {
        let up = self.check_connection().await;
        if !up {
            warn!("gateway not reachable at startup; heartbeat will keep retrying");
        }

        let heartbeat = tokio::spawn(heartbeat_task(
            self.clone(),
            self.inner.cancel.child_token(),
        ));
        self.inner.task_handles.lock().await.push(heartbeat);

        self.spawn_poller().await;
    }

    /// Check gateway liveness via the listing endpoint.
    ///
    /// Success makes the server's list the sole truth: the local
    /// subscription set is replaced wholesale (reconciliation). Failure
    /// clears it -- the gateway does not guarantee subscriptions survive
    /// a session loss. A new check supersedes any still-pending one.
    pub async fn check_connection(&self) -> bool {
        let token = {
            let mut guard = lock(&self.inner.check_cancel);
            guard.cancel();
            *guard = self.inner.cancel.child_token();
            guard.clone()
        };

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("connection check superseded");
                return false;
            }
            r = tokio::time::timeout(
                self.inner.config.heartbeat_timeout,
                self.inner.gateway.list_pvs(),
            ) => r,
        };

        match result {
            Ok(Ok(names)) => {
                let mut reconciled = Vec::with_capacity(names.len());
                for name in names {
                    match PvName::new(&name) {
                        Ok(pv) => reconciled.push(pv),
                        Err(err) => warn!(%name, error = %err, "gateway reported invalid PV name"),
                    }
                }
                debug!(count = reconciled.len(), "reconciled subscriptions from gateway");
                self.inner.registry.reconcile(reconciled);
                self.set_state(ConnectionState::Connected);
                true
            }
            Ok(Err(err)) => {
                // Non-2xx means the gateway is up but unhealthy; anything
                // else means the link itself is down.
                let next = if matches!(err, pvwatch_api::Error::Gateway { .. }) {
                    ConnectionState::Error
                } else {
                    ConnectionState::Disconnected
                };
                warn!(error = %err, "connection check failed");
                self.inner.registry.clear();
                self.set_state(next);
                false
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.inner.config.heartbeat_timeout.as_secs(),
                    "connection check timed out"
                );
                self.inner.registry.clear();
                self.set_state(ConnectionState::Disconnected);
                false
            }
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.connection_state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    fn set_state(&self, next: ConnectionState) {
        self.inner.connection_state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            info!(from = %state, to = %next, "connection state changed");
            *state = next;
            true
        });
    }

    // ── Subscription management ──────────────────────────────────

    /// Subscribe to a PV, optionally claiming it for a group.
    ///
    /// Validation and the duplicate-group check happen synchronously,
    /// before any network call. Subscribing to an already-subscribed PV
    /// is a no-op success.
    pub async fn subscribe(&self, raw: &str, group: Option<&str>) -> Result<PvName, CoreError> {
        let pv = PvName::new(raw)?;

        if let Some(owner) = self.inner.registry.group_of(&pv) {
            if let Some(group) = group {
                if owner != group {
                    return Err(CoreError::DuplicatePv {
                        pv: pv.to_string(),
                        existing_group: owner,
                    });
                }
            }
        }

        if self.inner.registry.contains(&pv) {
            debug!(%pv, "already subscribed");
            self.inner.registry.insert(pv.clone(), group)?;
            return Ok(pv);
        }

        if self.connection_state() != ConnectionState::Connected {
            return Err(CoreError::NotConnected);
        }

        self.subscribe_remote(&pv).await?;
        self.inner.registry.insert(pv.clone(), group)?;
        info!(%pv, group, "subscribed");
        Ok(pv)
    }

    /// Unsubscribe from a PV. Local intent wins: the PV is removed from
    /// the registry, sample table, and chart selection immediately; the
    /// gateway call is best-effort and its failure is only logged.
    pub async fn unsubscribe(&self, raw: &str) -> Result<(), CoreError> {
        let pv = PvName::new(raw)?;

        self.inner.registry.remove(&pv);
        self.inner.samples.remove(&pv);
        {
            let mut series = lock(&self.inner.series);
            let mut selected = series.selected();
            if let Some(pos) = selected.iter().position(|s| s == &pv) {
                selected.remove(pos);
                series.select(&selected);
            }
        }

        match tokio::time::timeout(
            self.inner.config.unsubscribe_timeout,
            self.inner.gateway.unsubscribe(pv.as_str()),
        )
        .await
        {
            Ok(Ok(())) => debug!(%pv, "unsubscribed from gateway"),
            Ok(Err(err)) => {
                warn!(%pv, error = %err, "gateway unsubscribe failed; local state already removed");
            }
            Err(_) => {
                warn!(%pv, "gateway unsubscribe timed out; local state already removed");
            }
        }
        Ok(())
    }

    /// Subscribe a batch of names for one group.
    ///
    /// Duplicate detection runs against a single membership snapshot
    /// taken before the first network call; names claimed by another
    /// group (or repeated in the input) never reach the gateway. The
    /// remaining names are subscribed sequentially with per-name outcome
    /// accounting -- one failure never aborts the batch -- and the full
    /// successful list is committed to the group in one mutation after
    /// all calls settle.
    ///
    /// A PV claimed by a concurrent operation between the snapshot and
    /// this batch's own network calls can race past the check; the
    /// gateway is the authoritative deduplicator for that window.
    pub async fn bulk_subscribe(
        &self,
        group: &str,
        names: &[String],
    ) -> Result<BulkSubscribeReport, CoreError> {
        if self.connection_state() != ConnectionState::Connected {
            return Err(CoreError::NotConnected);
        }

        let mut report = BulkSubscribeReport::default();

        // Dedup the input first, preserving order.
        let mut seen = BTreeSet::new();
        let mut unique = Vec::new();
        for raw in names {
            match PvName::new(raw) {
                Ok(pv) => {
                    if seen.insert(pv.clone()) {
                        unique.push(pv);
                    } else {
                        report
                            .duplicates
                            .push((pv.to_string(), "repeated in input".into()));
                    }
                }
                Err(err) => report.failed.push((raw.clone(), err.to_string())),
            }
        }

        // One snapshot decides every claim in this batch.
        let membership = self.inner.registry.membership_snapshot();
        let mut to_subscribe = Vec::new();
        for pv in unique {
            match membership.get(&pv) {
                Some(owner) if owner != group => {
                    report
                        .duplicates
                        .push((pv.to_string(), format!("claimed by group '{owner}'")));
                }
                Some(_) => {
                    // Already ours; counts as successful without a call.
                    report.already_subscribed.push(pv.clone());
                    report.successful.push(pv);
                }
                None if self.inner.registry.contains(&pv) => {
                    // Subscribed but unclaimed: adopt it into this group.
                    report.already_subscribed.push(pv.clone());
                    report.successful.push(pv);
                }
                None => to_subscribe.push(pv),
            }
        }

        for pv in to_subscribe {
            match self.subscribe_remote(&pv).await {
                Ok(()) => report.successful.push(pv),
                Err(err) => {
                    warn!(%pv, error = %err, "bulk subscribe entry failed");
                    report.failed.push((pv.to_string(), err.to_string()));
                }
            }
        }

        // Single commit: observers see the whole batch or none of it.
        self.inner.registry.commit_group(group, &report.successful);
        info!(group, summary = %report.summary(), "bulk subscribe finished");
        Ok(report)
    }

    /// Gateway subscribe bounded by the configured timeout.
    async fn subscribe_remote(&self, pv: &PvName) -> Result<(), CoreError> {
        tokio::time::timeout(
            self.inner.config.subscribe_timeout,
            self.inner.gateway.subscribe(pv.as_str()),
        )
        .await
        .map_err(|_| CoreError::Timeout {
            timeout_secs: self.inner.config.subscribe_timeout.as_secs(),
        })?
        .map_err(CoreError::from)
    }

    pub fn subscriptions(&self) -> Arc<BTreeSet<PvName>> {
        self.inner.registry.snapshot()
    }

    pub fn group_of(&self, pv: &PvName) -> Option<String> {
        self.inner.registry.group_of(pv)
    }

    pub fn group_membership(&self) -> BTreeMap<PvName, String> {
        self.inner.registry.membership_snapshot()
    }

    // ── Samples and errors ───────────────────────────────────────

    /// Latest-sample snapshot, one entry per polled PV.
    pub fn samples(&self) -> Arc<HashMap<PvName, Arc<PvSample>>> {
        self.inner.samples.snapshot()
    }

    /// Subscribe to sample snapshot changes (one update per poll cycle).
    pub fn watch_samples(&self) -> watch::Receiver<Arc<HashMap<PvName, Arc<PvSample>>>> {
        self.inner.samples.subscribe()
    }

    pub fn errors(&self) -> HashMap<PvName, ErrorRecord> {
        self.inner.samples.errors_snapshot()
    }

    /// Direct access to the sample table's derived helpers
    /// (status, formatted value, alarm level).
    pub fn table(&self) -> &SampleTable {
        &self.inner.samples
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        self.inner.samples.connection_stats(self.inner.registry.len())
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.inner.samples.last_update()
    }

    // ── Polling control ──────────────────────────────────────────

    /// Completed poll cycles since startup. Increments exactly once per
    /// fully settled cycle.
    pub fn cycles_completed(&self) -> u64 {
        self.inner.cycles_completed.load(Ordering::Relaxed)
    }

    /// Trigger one poll cycle immediately. Returns `false` if a cycle
    /// was already in flight (the request is dropped, not queued).
    pub async fn poll_now(&self) -> bool {
        poller::run_cycle(self).await
    }

    /// Change the polling frequency. The running poller task is
    /// superseded and any still-pending requests from its current cycle
    /// are cancelled.
    pub async fn set_poll_interval(&self, interval: Duration) {
        *lock(&self.inner.poll_interval) = interval;
        self.spawn_poller().await;
    }

    pub(crate) fn poll_period(&self) -> Duration {
        (*lock(&self.inner.poll_interval)).max(MIN_POLL_INTERVAL)
    }

    async fn spawn_poller(&self) {
        let token = {
            let mut guard = lock(&self.inner.poller_cancel);
            guard.cancel();
            *guard = self.inner.cancel.child_token();
            guard.clone()
        };
        // Kill stragglers from the superseded poller's cycle.
        lock(&self.inner.cycle_cancel).cancel();

        let handle = tokio::spawn(poller::poll_task(self.clone(), token));
        self.inner.task_handles.lock().await.push(handle);
    }

    // ── Charting ─────────────────────────────────────────────────

    /// Choose which PVs the series store tracks, then fetch their
    /// historical aggregates for the current window.
    pub async fn select_for_chart(&self, pvs: &[PvName]) -> Result<(), CoreError> {
        lock(&self.inner.series).select(pvs);
        self.refresh_history().await
    }

    /// Change the chart window. Accumulated live buffers are invalidated
    /// and historical aggregates are refetched for the new span.
    pub async fn set_window(&self, window: TimeWindow) -> Result<(), CoreError> {
        lock(&self.inner.series).set_window(window);
        self.refresh_history().await
    }

    pub fn window(&self) -> TimeWindow {
        lock(&self.inner.series).window()
    }

    pub fn set_scale(&self, scale: ScaleMode) {
        lock(&self.inner.series).set_scale(scale);
    }

    pub fn set_show_historical(&self, show: bool) {
        lock(&self.inner.series).set_show_historical(show);
    }

    pub async fn set_aggregation(&self, aggregation: Aggregation) -> Result<(), CoreError> {
        lock(&self.inner.series).set_aggregation(aggregation);
        self.refresh_history().await
    }

    /// Re-pull historical aggregates for the current selection/window.
    pub async fn refresh_history(&self) -> Result<(), CoreError> {
        let (selected, window, aggregation, show) = {
            let series = lock(&self.inner.series);
            (
                series.selected(),
                series.window(),
                series.aggregation(),
                series.show_historical(),
            )
        };
        if selected.is_empty() || !show {
            return Ok(());
        }

        let names: Vec<String> = selected.iter().map(ToString::to_string).collect();
        let data = self
            .inner
            .history
            .multiple_pv_history(
                &names,
                &window.time_range_param(),
                aggregation,
                window.interval_param(),
            )
            .await?;

        let mut typed = HashMap::with_capacity(data.len());
        for (name, points) in data {
            match PvName::new(&name) {
                Ok(pv) => {
                    typed.insert(pv, points);
                }
                Err(err) => warn!(%name, error = %err, "history reported invalid PV name"),
            }
        }
        lock(&self.inner.series).apply_historical(typed);
        Ok(())
    }

    /// Merged live+historical series per charted PV.
    pub fn merged_series(&self) -> HashMap<PvName, Vec<SeriesPoint>> {
        lock(&self.inner.series).merged(Utc::now())
    }

    /// Y-axis bounds for the current scale mode.
    pub fn scale_bounds(&self) -> (f64, f64) {
        lock(&self.inner.series).bounds(Utc::now())
    }

    /// Drop all accumulated chart data, keeping window and selection.
    pub fn clear_chart(&self) {
        lock(&self.inner.series).clear();
    }

    // ── Pass-through queries ─────────────────────────────────────

    pub async fn health(&self) -> Result<GatewayHealth, CoreError> {
        Ok(self.inner.gateway.health().await?)
    }

    pub async fn pv_history(
        &self,
        pv: &PvName,
        time_range: &str,
        aggregation: Aggregation,
        interval: &str,
    ) -> Result<Vec<HistoryPoint>, CoreError> {
        Ok(self
            .inner
            .history
            .pv_history(pv.as_str(), time_range, aggregation, interval)
            .await?)
    }

    pub async fn alarm_history(
        &self,
        time_range: &str,
        severity: Option<&str>,
    ) -> Result<Vec<AlarmEvent>, CoreError> {
        Ok(self.inner.history.alarm_history(time_range, severity).await?)
    }

    // ── Shutdown ─────────────────────────────────────────────────

    /// Stop background tasks, then unsubscribe every PV concurrently
    /// with settle-all semantics. Each unsubscribe is bounded by its own
    /// timeout, so an unresponsive gateway cannot block shutdown.
    pub async fn shutdown(&self) {
        info!("shutting down monitor");
        self.inner.cancel.cancel();
        lock(&self.inner.check_cancel).cancel();
        lock(&self.inner.cycle_cancel).cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        let pvs: Vec<PvName> = self.inner.registry.snapshot().iter().cloned().collect();
        if !pvs.is_empty() {
            debug!(count = pvs.len(), "unsubscribing remaining PVs");
            let timeout = self.inner.config.unsubscribe_timeout;
            let outcomes = join_all(pvs.iter().map(|pv| {
                let gateway = self.inner.gateway.clone();
                async move {
                    match tokio::time::timeout(timeout, gateway.unsubscribe(pv.as_str())).await {
                        Ok(Ok(())) => true,
                        Ok(Err(err)) => {
                            warn!(%pv, error = %err, "unsubscribe failed during shutdown");
                            false
                        }
                        Err(_) => {
                            warn!(%pv, "unsubscribe timed out during shutdown");
                            false
                        }
                    }
                }
            }))
            .await;

            let failed = outcomes.iter().filter(|ok| !**ok).count();
            if failed > 0 {
                warn!(failed, total = outcomes.len(), "shutdown unsubscribe incomplete");
            }
        }

        self.inner.registry.clear();
        self.set_state(ConnectionState::Disconnected);
        debug!("monitor shut down");
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Periodic connection heartbeat. The immediate first tick is consumed
/// because `start()` already ran a check.
async fn heartbeat_task(monitor: Monitor, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(monitor.inner.config.heartbeat_interval);
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                monitor.check_connection().await;
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Lock a std mutex, ignoring poisoning: all guarded state here stays
/// consistent even if a panicking thread held the guard.
pub(crate) fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
