// ── Time-windowed series store ──
//
// Per-PV live buffers with sliding-window eviction, merged on demand with
// externally fetched historical aggregates. Everything here is pure and
// synchronous: callers pass `now` explicitly, which keeps the eviction and
// merge rules directly testable.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

use pvwatch_api::{Aggregation, HistoryPoint};

use crate::model::{PvName, PvSample};

/// Fallback axis bounds when nothing is plotted yet.
const EMPTY_BOUNDS: (f64, f64) = (0.0, 100.0);

/// Fraction of the value span added above and below in auto-scale mode.
const SCALE_PADDING: f64 = 0.1;

// ── TimeWindow ──────────────────────────────────────────────────────

/// The bounded recent time span retained for live chart samples. Also
/// derives the history request parameters for the same span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    duration_secs: u64,
}

impl TimeWindow {
    pub fn from_secs(duration_secs: u64) -> Self {
        Self { duration_secs }
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    /// Everything older than this instant falls out of the window.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - ChronoDuration::seconds(self.duration_secs.min(i64::MAX as u64) as i64)
    }

    /// `timeRange` query value for the history service.
    pub fn time_range_param(&self) -> String {
        format!("{}s", self.duration_secs)
    }

    /// Bucket width for history queries: coarse buckets past one hour,
    /// fine buckets inside it.
    pub fn interval_param(&self) -> &'static str {
        if self.duration_secs > 3600 { "1m" } else { "10s" }
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self { duration_secs: 300 }
    }
}

// ── Points and scale ────────────────────────────────────────────────

/// One point of a merged chart series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub is_historical: bool,
}

/// Y-axis scaling policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleMode {
    /// Min/max across all displayed series, padded 10% each side.
    Auto,
    /// Operator-supplied bounds.
    Fixed { min: f64, max: f64 },
}

// ── SeriesStore ─────────────────────────────────────────────────────

/// Per-PV live buffers plus the historical overlay for the current
/// window. Owned by the monitor; mutated only through these methods.
pub struct SeriesStore {
    window: TimeWindow,
    scale: ScaleMode,
    show_historical: bool,
    aggregation: Aggregation,
    live: HashMap<PvName, Vec<SeriesPoint>>,
    historical: HashMap<PvName, Vec<SeriesPoint>>,
    /// Latest historical timestamp per PV; the live/historical merge
    /// boundary.
    latest_historical: HashMap<PvName, DateTime<Utc>>,
}

impl SeriesStore {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            scale: ScaleMode::Auto,
            show_historical: true,
            aggregation: Aggregation::default(),
            live: HashMap::new(),
            historical: HashMap::new(),
            latest_historical: HashMap::new(),
        }
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn scale(&self) -> ScaleMode {
        self.scale
    }

    pub fn set_scale(&mut self, scale: ScaleMode) {
        self.scale = scale;
    }

    pub fn show_historical(&self) -> bool {
        self.show_historical
    }

    pub fn set_show_historical(&mut self, show: bool) {
        self.show_historical = show;
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    pub fn set_aggregation(&mut self, aggregation: Aggregation) {
        self.aggregation = aggregation;
    }

    /// The PVs currently tracked by the store.
    pub fn selected(&self) -> Vec<PvName> {
        self.live.keys().cloned().collect()
    }

    // ── Window / selection lifecycle ─────────────────────────────────

    /// Change the window. Accumulated live buffers no longer match the
    /// new span's bucketing, so everything is invalidated; the caller
    /// must refetch historical aggregates for the new range.
    pub fn set_window(&mut self, window: TimeWindow) {
        if window == self.window {
            return;
        }
        self.window = window;
        for buffer in self.live.values_mut() {
            buffer.clear();
        }
        self.historical.clear();
        self.latest_historical.clear();
    }

    /// Replace the tracked PV set. Buffers for deselected PVs are
    /// dropped; newly selected PVs start empty.
    pub fn select(&mut self, pvs: &[PvName]) {
        self.live.retain(|pv, _| pvs.contains(pv));
        self.historical.retain(|pv, _| pvs.contains(pv));
        self.latest_historical.retain(|pv, _| pvs.contains(pv));
        for pv in pvs {
            self.live.entry(pv.clone()).or_default();
        }
    }

    /// Drop all accumulated data, keeping window and selection.
    pub fn clear(&mut self) {
        for buffer in self.live.values_mut() {
            buffer.clear();
        }
        self.historical.clear();
        self.latest_historical.clear();
    }

    // ── Live ingestion ───────────────────────────────────────────────

    /// Append one cycle's sample for a tracked PV and slide the window.
    ///
    /// Only connected, numeric samples are admitted; error placeholders
    /// and string-valued records never enter a chart series. Out-of-order
    /// samples (older than the buffer tail) are dropped to keep
    /// timestamps non-decreasing.
    pub fn record(&mut self, sample: &PvSample, now: DateTime<Utc>) {
        let Some(buffer) = self.live.get_mut(&sample.pv) else {
            return;
        };
        let Some(value) = sample.numeric_value.filter(|_| sample.is_connected) else {
            Self::evict(buffer, self.window.cutoff(now));
            return;
        };

        if buffer
            .last()
            .is_none_or(|last| sample.timestamp >= last.timestamp)
        {
            buffer.push(SeriesPoint {
                timestamp: sample.timestamp,
                value,
                is_historical: false,
            });
        }

        Self::evict(buffer, self.window.cutoff(now));
    }

    // ── Historical overlay ───────────────────────────────────────────

    /// Install freshly fetched historical aggregates, replacing any
    /// previous overlay.
    pub fn apply_historical(&mut self, data: HashMap<PvName, Vec<HistoryPoint>>) {
        self.historical.clear();
        self.latest_historical.clear();

        for (pv, points) in data {
            let mut series: Vec<SeriesPoint> = points
                .into_iter()
                .map(|p| SeriesPoint {
                    timestamp: p.time,
                    value: p.value,
                    is_historical: true,
                })
                .collect();
            series.sort_by_key(|p| p.timestamp);

            if let Some(last) = series.last() {
                self.latest_historical.insert(pv.clone(), last.timestamp);
            }
            self.historical.insert(pv, series);
        }
    }

    // ── Merge ────────────────────────────────────────────────────────

    /// Merged series per tracked PV: historical points first, then live
    /// points strictly newer than the PV's latest historical timestamp.
    /// That strict comparison is the sole tie-break at the seam -- an
    /// equal-timestamp live point loses to the historical one. Both
    /// halves are clipped to the window.
    pub fn merged(&self, now: DateTime<Utc>) -> HashMap<PvName, Vec<SeriesPoint>> {
        let cutoff = self.window.cutoff(now);
        let mut merged = HashMap::with_capacity(self.live.len());

        for (pv, live) in &self.live {
            let mut series: Vec<SeriesPoint> = Vec::new();

            let boundary = if self.show_historical {
                if let Some(historical) = self.historical.get(pv) {
                    series.extend(historical.iter().filter(|p| p.timestamp >= cutoff));
                }
                self.latest_historical.get(pv).copied()
            } else {
                None
            };

            series.extend(live.iter().filter(|p| {
                p.timestamp >= cutoff && boundary.is_none_or(|b| p.timestamp > b)
            }));

            merged.insert(pv.clone(), series);
        }

        merged
    }

    /// Y-axis bounds for the current mode over the merged series.
    pub fn bounds(&self, now: DateTime<Utc>) -> (f64, f64) {
        match self.scale {
            ScaleMode::Fixed { min, max } => (min, max),
            ScaleMode::Auto => {
                let merged = self.merged(now);
                let values = merged.values().flatten().map(|p| p.value);

                let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
                for v in values {
                    min = min.min(v);
                    max = max.max(v);
                }
                if min > max {
                    return EMPTY_BOUNDS;
                }

                let padding = (max - min) * SCALE_PADDING;
                (min - padding, max + padding)
            }
        }
    }

    /// Total number of buffered live points, across all PVs.
    pub fn live_point_count(&self) -> usize {
        self.live.values().map(Vec::len).sum()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn evict(buffer: &mut Vec<SeriesPoint>, cutoff: DateTime<Utc>) {
        buffer.retain(|p| p.timestamp >= cutoff);
    }
}

impl Default for SeriesStore {
    fn default() -> Self {
        Self::new(TimeWindow::default())
    }
}
