//! Metrics registry
//!
//! - Counters only
//! - Monotonic increase
//! - Thread-safe, relaxed atomics

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for overlays and version histories.
///
/// Shared by reference (`Arc`) between every overlay and history that
/// should report into it.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    transactions_begun: AtomicU64,
    transactions_prepared: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,
    prepare_failures: AtomicU64,
    commit_failures: AtomicU64,
    entities_applied: AtomicU64,
    versions_created: AtomicU64,
    versions_removed: AtomicU64,
    graph_repairs: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_transactions_begun(&self) {
        self.transactions_begun.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transactions_prepared(&self) {
        self.transactions_prepared.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transactions_committed(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transactions_rolled_back(&self) {
        self.transactions_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_prepare_failures(&self) {
        self.prepare_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_commit_failures(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Add the number of entities written by one atomic apply
    pub fn add_entities_applied(&self, count: u64) {
        self.entities_applied.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_versions_created(&self) {
        self.versions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_versions_removed(&self) {
        self.versions_removed.fetch_add(1, Ordering::Relaxed);
    }

    /// Add the number of successor edges derived by a repair pass
    pub fn add_graph_repairs(&self, count: u64) {
        self.graph_repairs.fetch_add(count, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transactions_begun: self.transactions_begun.load(Ordering::Relaxed),
            transactions_prepared: self.transactions_prepared.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_rolled_back: self.transactions_rolled_back.load(Ordering::Relaxed),
            prepare_failures: self.prepare_failures.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            entities_applied: self.entities_applied.load(Ordering::Relaxed),
            versions_created: self.versions_created.load(Ordering::Relaxed),
            versions_removed: self.versions_removed.load(Ordering::Relaxed),
            graph_repairs: self.graph_repairs.load(Ordering::Relaxed),
        }
    }

    /// Get current values as a JSON object string
    pub fn to_json(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"{{"transactions_begun":{},"transactions_prepared":{},"transactions_committed":{},"transactions_rolled_back":{},"prepare_failures":{},"commit_failures":{},"entities_applied":{},"versions_created":{},"versions_removed":{},"graph_repairs":{}}}"#,
            s.transactions_begun,
            s.transactions_prepared,
            s.transactions_committed,
            s.transactions_rolled_back,
            s.prepare_failures,
            s.commit_failures,
            s.entities_applied,
            s.versions_created,
            s.versions_removed,
            s.graph_repairs,
        )
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub transactions_begun: u64,
    pub transactions_prepared: u64,
    pub transactions_committed: u64,
    pub transactions_rolled_back: u64,
    pub prepare_failures: u64,
    pub commit_failures: u64,
    pub entities_applied: u64,
    pub versions_created: u64,
    pub versions_removed: u64,
    pub graph_repairs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_zero() {
        let snapshot = MetricsRegistry::new().snapshot();
        assert_eq!(snapshot.transactions_committed, 0);
        assert_eq!(snapshot.entities_applied, 0);
    }

    #[test]
    fn test_counters_accumulate() {
        let registry = MetricsRegistry::new();
        registry.increment_transactions_committed();
        registry.increment_transactions_committed();
        registry.add_entities_applied(5);
        registry.increment_prepare_failures();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.transactions_committed, 2);
        assert_eq!(snapshot.entities_applied, 5);
        assert_eq!(snapshot.prepare_failures, 1);
    }

    #[test]
    fn test_to_json_parses() {
        let registry = MetricsRegistry::new();
        registry.increment_versions_created();
        registry.add_graph_repairs(3);

        let parsed: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(parsed["versions_created"], 1);
        assert_eq!(parsed["graph_repairs"], 3);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        reg.increment_transactions_begun();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.snapshot().transactions_begun, 800);
    }
}
