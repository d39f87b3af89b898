// ── Reactive sample table ──
//
// Lock-free concurrent storage for the latest sample and error record per
// PV. Mutations are broadcast to subscribers via a `watch` channel so the
// presentation layer can await changes instead of re-polling.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;

use crate::model::{AlarmLevel, ErrorRecord, PvName, PvSample, PvStatus};

/// Aggregate connection counters across the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub total: usize,
    pub connected: usize,
    pub with_alarms: usize,
    pub with_errors: usize,
}

/// Latest-sample and latest-error tables, one entry per subscribed PV.
///
/// Samples are replaced wholesale each poll cycle; an error record exists
/// only while the most recent poll for that PV failed.
pub struct SampleTable {
    samples: DashMap<PvName, Arc<PvSample>>,
    errors: DashMap<PvName, ErrorRecord>,
    snapshot: watch::Sender<Arc<HashMap<PvName, Arc<PvSample>>>>,
    last_update: watch::Sender<Option<DateTime<Utc>>>,
}

impl SampleTable {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(HashMap::new()));
        let (last_update, _) = watch::channel(None);
        Self {
            samples: DashMap::new(),
            errors: DashMap::new(),
            snapshot,
            last_update,
        }
    }

    // ── Mutations (poll pipeline only) ───────────────────────────────

    /// Install a successful sample, clearing any standing error record.
    pub(crate) fn apply_success(&self, sample: PvSample) {
        self.errors.remove(&sample.pv);
        self.samples
            .insert(sample.pv.clone(), Arc::new(sample));
    }

    /// Record a failed poll: an error record plus a synthetic
    /// error-status sample so consumers never render a stale value.
    pub(crate) fn apply_failure(&self, record: ErrorRecord) {
        let placeholder = PvSample::error_placeholder(record.pv.clone(), record.timestamp);
        self.samples
            .insert(record.pv.clone(), Arc::new(placeholder));
        self.errors.insert(record.pv.clone(), record);
    }

    /// Publish one snapshot for everything the cycle changed and stamp
    /// the update time.
    pub(crate) fn finish_cycle(&self, at: DateTime<Utc>) {
        self.rebuild_snapshot();
        self.last_update.send_modify(|t| *t = Some(at));
    }

    /// Drop a PV's entries entirely (unsubscribe path).
    pub(crate) fn remove(&self, pv: &PvName) {
        let had_sample = self.samples.remove(pv).is_some();
        self.errors.remove(pv);
        if had_sample {
            self.rebuild_snapshot();
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get(&self, pv: &PvName) -> Option<Arc<PvSample>> {
        self.samples.get(pv).map(|r| Arc::clone(r.value()))
    }

    pub fn error_of(&self, pv: &PvName) -> Option<ErrorRecord> {
        self.errors.get(pv).map(|r| r.value().clone())
    }

    /// Current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<HashMap<PvName, Arc<PvSample>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub fn subscribe(&self) -> watch::Receiver<Arc<HashMap<PvName, Arc<PvSample>>>> {
        self.snapshot.subscribe()
    }

    pub fn errors_snapshot(&self) -> HashMap<PvName, ErrorRecord> {
        self.errors
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    /// When the last poll cycle finished, or `None` before the first.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.borrow()
    }

    /// Status precedence: a standing error wins, then missing data, then
    /// alarm, then channel connectivity.
    pub fn status_of(&self, pv: &PvName) -> PvStatus {
        if self.errors.contains_key(pv) {
            return PvStatus::Error;
        }
        match self.get(pv) {
            None => PvStatus::Unknown,
            Some(sample) if sample.has_alarm => PvStatus::Alarm,
            Some(sample) if !sample.is_connected => PvStatus::Disconnected,
            Some(_) => PvStatus::Connected,
        }
    }

    /// Display string for a PV's current value (`"N/A"` when absent).
    pub fn formatted_value(&self, pv: &PvName) -> String {
        self.get(pv)
            .map_or_else(|| "N/A".into(), |sample| sample.display_value())
    }

    pub fn alarm_level(&self, pv: &PvName) -> AlarmLevel {
        self.get(pv)
            .map_or(AlarmLevel::None, |sample| sample.alarm_level())
    }

    /// Aggregate counters. `total` is the subscription count, which can
    /// exceed the table size before the first cycle completes.
    pub fn connection_stats(&self, total: usize) -> ConnectionStats {
        let connected = self
            .samples
            .iter()
            .filter(|r| r.value().is_connected)
            .count();
        let with_alarms = self
            .samples
            .iter()
            .filter(|r| r.value().has_alarm)
            .count();
        ConnectionStats {
            total,
            connected,
            with_alarms,
            with_errors: self.errors.len(),
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        let map: HashMap<PvName, Arc<PvSample>> = self
            .samples
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        self.snapshot.send_modify(|snap| *snap = Arc::new(map));
    }
}

impl Default for SampleTable {
    fn default() -> Self {
        Self::new()
    }
}
