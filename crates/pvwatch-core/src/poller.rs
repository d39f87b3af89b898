// ── Polling engine ──
//
// Timer-driven fan-out fetch of all subscribed PVs. One cycle at a time:
// a tick that fires while a cycle is in flight is dropped, not queued, so
// outstanding requests never exceed one full fan-out regardless of
// gateway latency. Per-PV failures are isolated; a cycle's results are
// fully applied before the next may begin.

use chrono::Utc;
use futures_util::future::join_all;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use pvwatch_api::RawPvReading;

use crate::error::CoreError;
use crate::model::{ErrorKind, ErrorRecord, PvName};
use crate::monitor::{lock, Monitor, MonitorInner};
use crate::normalize;

/// Poll subscribed PVs until cancelled.
///
/// Delayed ticks are skipped rather than bursted; combined with the
/// cycle gate this bounds in-flight work to one fan-out.
pub(crate) async fn poll_task(monitor: Monitor, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(monitor.poll_period());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                run_cycle(&monitor).await;
            }
        }
    }
}

/// Run one poll cycle. Returns `true` if the cycle ran to completion and
/// its results were applied.
pub(crate) async fn run_cycle(monitor: &Monitor) -> bool {
    let inner = monitor.inner();

    // Overlap prevention: the gate is held for the whole cycle.
    let Ok(_gate) = inner.cycle_gate.try_lock() else {
        debug!("poll cycle already in flight; tick dropped");
        return false;
    };

    let pvs = inner.registry.snapshot();
    if pvs.is_empty() {
        return false;
    }

    // This cycle's token supersedes the previous one: any stragglers
    // still pending from an aborted cycle die now.
    let cycle = {
        let mut guard = lock(&inner.cycle_cancel);
        guard.cancel();
        *guard = CancellationToken::new();
        guard.clone()
    };

    let started = Utc::now();
    debug!(pvs = pvs.len(), "poll cycle started");

    // Settle-all fan-out: every fetch resolves to an outcome, one PV's
    // failure never blocks the others.
    let outcomes = join_all(pvs.iter().map(|pv| fetch_one(inner, pv, &cycle))).await;

    if cycle.is_cancelled() {
        debug!("poll cycle cancelled; results discarded");
        return false;
    }

    let mut ok = 0usize;
    let mut failed = 0usize;
    {
        let mut series = lock(&inner.series);
        for (pv, outcome) in outcomes {
            match outcome {
                Ok(raw) => {
                    let sample = normalize::normalize(&pv, raw, started);
                    series.record(&sample, started);
                    inner.samples.apply_success(sample);
                    ok += 1;
                }
                Err(err) => {
                    warn!(%pv, error = %err, "poll fetch failed");
                    inner.samples.apply_failure(ErrorRecord {
                        kind: ErrorKind::of(&err),
                        pv,
                        message: err.to_string(),
                        timestamp: started,
                    });
                    failed += 1;
                }
            }
        }
    }

    inner.samples.finish_cycle(started);
    inner
        .cycles_completed
        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    debug!(ok, failed, "poll cycle complete");
    true
}

/// Fetch one PV's value under the cycle token and the per-fetch timeout.
async fn fetch_one(
    inner: &MonitorInner,
    pv: &PvName,
    cycle: &CancellationToken,
) -> (PvName, Result<RawPvReading, CoreError>) {
    let timeout = inner.config.fetch_timeout;
    let result = tokio::select! {
        biased;
        _ = cycle.cancelled() => Err(CoreError::Unreachable {
            reason: "request cancelled".into(),
        }),
        fetched = tokio::time::timeout(timeout, inner.gateway.read_pv(pv.as_str())) => {
            match fetched {
                Ok(Ok(raw)) => Ok(raw),
                Ok(Err(err)) => Err(err.into()),
                Err(_) => Err(CoreError::Timeout {
                    timeout_secs: timeout.as_secs(),
                }),
            }
        }
    };
    (pv.clone(), result)
}
