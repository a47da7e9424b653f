//! Membership metrics
//!
//! Counters for membership churn, filter flips and ownership arbitration.
//! All counters are relaxed atomics; a snapshot is a point-in-time view,
//! not a consistent cut across counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Engine-wide counters
#[derive(Debug, Default)]
pub struct AudienceMetrics {
    /// Actors inserted into any membership set
    pub actors_added: AtomicU64,

    /// Actors removed from any membership set
    pub actors_removed: AtomicU64,

    /// Display activations
    pub activations: AtomicU64,

    /// Display releases (drained or forced)
    pub deactivations: AtomicU64,

    /// Filter refreshes evaluated
    pub refreshes: AtomicU64,

    /// Filtered-set flips (either direction)
    pub filter_flips: AtomicU64,

    /// Policy evaluations that returned an error
    pub policy_failures: AtomicU64,

    /// Owner records created
    pub owners_created: AtomicU64,

    /// Ownership transfers between siblings
    pub ownership_transfers: AtomicU64,

    /// Owner records disposed
    pub owners_disposed: AtomicU64,

    /// Host ticks
    pub ticks: AtomicU64,
}

impl AudienceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_add(&self) {
        self.actors_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remove(&self) {
        self.actors_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_activation(&self) {
        self.activations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deactivation(&self) {
        self.deactivations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filter_flip(&self) {
        self.filter_flips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_policy_failure(&self) {
        self.policy_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_owner_created(&self) {
        self.owners_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transfer(&self) {
        self.ownership_transfers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_owner_disposed(&self) {
        self.owners_disposed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.actors_added,
            &self.actors_removed,
            &self.activations,
            &self.deactivations,
            &self.refreshes,
            &self.filter_flips,
            &self.policy_failures,
            &self.owners_created,
            &self.ownership_transfers,
            &self.owners_disposed,
            &self.ticks,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            actors_added: self.actors_added.load(Ordering::Relaxed),
            actors_removed: self.actors_removed.load(Ordering::Relaxed),
            activations: self.activations.load(Ordering::Relaxed),
            deactivations: self.deactivations.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            filter_flips: self.filter_flips.load(Ordering::Relaxed),
            policy_failures: self.policy_failures.load(Ordering::Relaxed),
            owners_created: self.owners_created.load(Ordering::Relaxed),
            ownership_transfers: self.ownership_transfers.load(Ordering::Relaxed),
            owners_disposed: self.owners_disposed.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of engine metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub actors_added: u64,
    pub actors_removed: u64,
    pub activations: u64,
    pub deactivations: u64,
    pub refreshes: u64,
    pub filter_flips: u64,
    pub policy_failures: u64,
    pub owners_created: u64,
    pub ownership_transfers: u64,
    pub owners_disposed: u64,
    pub ticks: u64,
}

impl MetricsSnapshot {
    /// Owner records still alive
    pub fn live_owners(&self) -> u64 {
        self.owners_created.saturating_sub(self.owners_disposed)
    }

    /// Displays currently active
    pub fn active_displays(&self) -> u64 {
        self.activations.saturating_sub(self.deactivations)
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "  Members: +{} / -{} | Active displays: {}",
            self.actors_added,
            self.actors_removed,
            self.active_displays()
        )?;
        writeln!(
            f,
            "  Refreshes: {} | Filter flips: {} | Policy failures: {}",
            self.refreshes, self.filter_flips, self.policy_failures
        )?;
        writeln!(
            f,
            "  Owners: {} live | {} transfers | Ticks: {}",
            self.live_owners(),
            self.ownership_transfers,
            self.ticks
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_basic() {
        let metrics = AudienceMetrics::new();

        metrics.record_add();
        metrics.record_add();
        metrics.record_remove();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.actors_added, 2);
        assert_eq!(snapshot.actors_removed, 1);
    }

    #[test]
    fn test_live_owners() {
        let metrics = AudienceMetrics::new();

        metrics.record_owner_created();
        metrics.record_owner_created();
        metrics.record_owner_disposed();

        assert_eq!(metrics.snapshot().live_owners(), 1);
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = AudienceMetrics::new();

        metrics.record_activation();
        metrics.record_tick();
        metrics.reset();

        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_snapshot_display() {
        let metrics = AudienceMetrics::new();
        metrics.record_activation();
        metrics.record_transfer();

        let text = metrics.snapshot().to_string();
        assert!(text.contains("Active displays: 1"));
        assert!(text.contains("1 transfers"));
    }
}
