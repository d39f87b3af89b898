// ── Subscription registry ──
//
// Canonical holder of the subscription set and group membership.
// All mutation funnels through these methods; observers read committed
// snapshots broadcast via a `watch` channel. The uniqueness invariant --
// a PV belongs to at most one group -- is enforced here and nowhere else.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::watch;

use crate::error::CoreError;
use crate::model::PvName;

#[derive(Default)]
struct RegistryState {
    subscribed: BTreeSet<PvName>,
    /// PV -> owning group. Keys are always a subset of `subscribed`.
    groups: BTreeMap<PvName, String>,
}

/// Owns the subscription set and group membership.
pub struct SubscriptionRegistry {
    state: RwLock<RegistryState>,
    snapshot: watch::Sender<Arc<BTreeSet<PvName>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(BTreeSet::new()));
        Self {
            state: RwLock::new(RegistryState::default()),
            snapshot,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn contains(&self, pv: &PvName) -> bool {
        self.read().subscribed.contains(pv)
    }

    /// The group currently claiming `pv`, if any.
    pub fn group_of(&self, pv: &PvName) -> Option<String> {
        self.read().groups.get(pv).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().subscribed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().subscribed.is_empty()
    }

    /// Current subscription set (cheap `Arc` clone of the last broadcast).
    pub fn snapshot(&self) -> Arc<BTreeSet<PvName>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to subscription-set changes.
    pub fn subscribe_changes(&self) -> watch::Receiver<Arc<BTreeSet<PvName>>> {
        self.snapshot.subscribe()
    }

    /// Point-in-time copy of the full group membership map.
    pub fn membership_snapshot(&self) -> BTreeMap<PvName, String> {
        self.read().groups.clone()
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Record a successful subscribe. With a group, the PV is claimed for
    /// it; the claim fails if another group already owns the name.
    pub fn insert(&self, pv: PvName, group: Option<&str>) -> Result<(), CoreError> {
        let mut state = self.write();

        if let (Some(group), Some(owner)) = (group, state.groups.get(&pv)) {
            if owner != group {
                return Err(CoreError::DuplicatePv {
                    pv: pv.to_string(),
                    existing_group: owner.clone(),
                });
            }
        }

        state.subscribed.insert(pv.clone());
        if let Some(group) = group {
            state.groups.insert(pv, group.to_owned());
        }

        self.broadcast(&state);
        Ok(())
    }

    /// Remove a PV from the set and from whichever group claimed it.
    pub fn remove(&self, pv: &PvName) {
        let mut state = self.write();
        state.subscribed.remove(pv);
        state.groups.remove(pv);
        self.broadcast(&state);
    }

    /// Commit a bulk result: add every PV to the set and claim all of
    /// them for `group` in one mutation, so observers never see a
    /// half-applied batch.
    pub fn commit_group(&self, group: &str, pvs: &[PvName]) {
        if pvs.is_empty() {
            return;
        }
        let mut state = self.write();
        for pv in pvs {
            state.subscribed.insert(pv.clone());
            state.groups.insert(pv.clone(), group.to_owned());
        }
        self.broadcast(&state);
    }

    /// Replace the set wholesale with the gateway's authoritative list.
    ///
    /// Group claims survive only for PVs still present in the new set;
    /// claims for vanished PVs are dropped.
    pub fn reconcile(&self, names: impl IntoIterator<Item = PvName>) {
        let mut state = self.write();
        state.subscribed = names.into_iter().collect();
        let subscribed = state.subscribed.clone();
        state.groups.retain(|pv, _| subscribed.contains(pv));
        self.broadcast(&state);
    }

    /// Drop all subscription state. Invoked when the gateway link breaks:
    /// the gateway does not guarantee subscriptions survive a session
    /// loss, so local state is no longer meaningful.
    pub fn clear(&self) {
        let mut state = self.write();
        state.subscribed.clear();
        state.groups.clear();
        self.broadcast(&state);
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn broadcast(&self, state: &RegistryState) {
        let snap = Arc::new(state.subscribed.clone());
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|s| *s = snap);
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Bulk subscribe report ────────────────────────────────────────────

/// Per-name outcome of a bulk subscribe, returned to the caller instead
/// of being pushed through callbacks. The caller owns what happens next.
#[derive(Debug, Default, Serialize)]
pub struct BulkSubscribeReport {
    /// Subscribed (or re-claimed) and committed to the target group.
    pub successful: Vec<PvName>,
    /// Names whose subscribe call failed, with the reason. Raw strings
    /// because malformed input never becomes a `PvName`.
    pub failed: Vec<(String, String)>,
    /// Already subscribed under the target group (or unclaimed); no
    /// network call was made, but they count as successful.
    pub already_subscribed: Vec<PvName>,
    /// Rejected without a network call, as `(name, reason)`: input
    /// repeats, invalid names, and names owned by another group.
    pub duplicates: Vec<(String, String)>,
}

impl BulkSubscribeReport {
    /// True when at least one name ended up in the target group.
    pub fn any_successful(&self) -> bool {
        !self.successful.is_empty()
    }

    /// Human-readable one-line-per-bucket summary.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        if !self.successful.is_empty() {
            lines.push(format!("added {} PV(s)", self.successful.len()));
        }
        if !self.already_subscribed.is_empty() {
            lines.push(format!(
                "{} already subscribed",
                self.already_subscribed.len()
            ));
        }
        if !self.duplicates.is_empty() {
            lines.push(format!("{} duplicate(s) skipped", self.duplicates.len()));
        }
        if !self.failed.is_empty() {
            let names: Vec<&str> = self
                .failed
                .iter()
                .take(5)
                .map(|(name, _)| name.as_str())
                .collect();
            let mut line = format!("{} failed: {}", self.failed.len(), names.join(", "));
            if self.failed.len() > names.len() {
                line.push_str(&format!(" and {} more", self.failed.len() - names.len()));
            }
            lines.push(line);
        }
        if lines.is_empty() {
            lines.push("no changes made".into());
        }
        lines.join("; ")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pv(name: &str) -> PvName {
        PvName::new(name).unwrap()
    }

    #[test]
    fn insert_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        registry.insert(pv("DEV:TEMP"), None).unwrap();
        registry.insert(pv("DEV:TEMP"), None).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn cross_group_claim_is_rejected() {
        let registry = SubscriptionRegistry::new();
        registry.insert(pv("X:Y"), Some("A")).unwrap();

        let err = registry.insert(pv("X:Y"), Some("B")).unwrap_err();
        match err {
            CoreError::DuplicatePv { existing_group, .. } => assert_eq!(existing_group, "A"),
            other => panic!("expected DuplicatePv, got {other:?}"),
        }

        // Re-claiming for the same group stays fine.
        registry.insert(pv("X:Y"), Some("A")).unwrap();
    }

    #[test]
    fn remove_releases_the_claim() {
        let registry = SubscriptionRegistry::new();
        registry.insert(pv("X:Y"), Some("A")).unwrap();
        registry.remove(&pv("X:Y"));
        assert!(registry.group_of(&pv("X:Y")).is_none());
        registry.insert(pv("X:Y"), Some("B")).unwrap();
    }

    #[test]
    fn reconcile_replaces_wholesale_and_prunes_claims() {
        let registry = SubscriptionRegistry::new();
        registry.insert(pv("DEV:TEMP"), Some("A")).unwrap();
        registry.insert(pv("DEV:FLOW"), Some("A")).unwrap();

        registry.reconcile([pv("DEV:TEMP"), pv("DEV:PRESSURE")]);

        assert!(registry.contains(&pv("DEV:TEMP")));
        assert!(registry.contains(&pv("DEV:PRESSURE")));
        assert!(!registry.contains(&pv("DEV:FLOW")));
        // Claim survives for the PV that survived, is dropped for the rest.
        assert_eq!(registry.group_of(&pv("DEV:TEMP")).as_deref(), Some("A"));
        assert!(registry.group_of(&pv("DEV:FLOW")).is_none());
    }

    #[test]
    fn commit_group_is_one_broadcast() {
        let registry = SubscriptionRegistry::new();
        let mut rx = registry.subscribe_changes();
        rx.borrow_and_update();

        registry.commit_group("A", &[pv("DEV:TEMP"), pv("DEV:FLOW")]);

        assert!(rx.has_changed().unwrap());
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.len(), 2);
        // A single commit produces a single change notification.
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn clear_drops_set_and_claims() {
        let registry = SubscriptionRegistry::new();
        registry.insert(pv("DEV:TEMP"), Some("A")).unwrap();
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.membership_snapshot().is_empty());
    }

    #[test]
    fn report_summary_mentions_each_bucket() {
        let report = BulkSubscribeReport {
            successful: vec![pv("A:1"), pv("A:2")],
            failed: vec![("A:3".into(), "timeout".into())],
            already_subscribed: vec![pv("A:4")],
            duplicates: vec![("A:5".into(), "claimed by group 'other'".into())],
        };
        let summary = report.summary();
        assert!(summary.contains("added 2"));
        assert!(summary.contains("1 already subscribed"));
        assert!(summary.contains("1 duplicate(s)"));
        assert!(summary.contains("A:3"));
    }
}
