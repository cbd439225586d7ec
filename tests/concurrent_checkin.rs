//! Concurrent Checkin Tests
//!
//! Tests for:
//! - Each thread owns its overlay; the store and history are shared
//! - Concurrent checkins serialize on the history and all land
//! - Generated version names stay unique
//! - The graph is consistent once every writer is done

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::thread;

use versionvault::observability::MetricsRegistry;
use versionvault::state::{ChangeLog, EntityId, EntityState, MemoryStateStore};
use versionvault::txn::TransactionalOverlay;
use versionvault::version::VersionHistory;

const WRITERS: usize = 4;
const CHECKINS_PER_WRITER: usize = 8;

// =============================================================================
// Test Utilities
// =============================================================================

fn shared_history() -> (Arc<MemoryStateStore>, Arc<VersionHistory>, Arc<MetricsRegistry>) {
    let store = Arc::new(MemoryStateStore::new());
    let metrics = Arc::new(MetricsRegistry::new());
    let mut overlay = TransactionalOverlay::new(store.clone());
    let history = VersionHistory::create(&mut overlay)
        .unwrap()
        .with_metrics(metrics.clone());
    (store, Arc::new(history), metrics)
}

// =============================================================================
// Checkins
// =============================================================================

/// Writers extending the root concurrently never lose a version.
#[test]
fn test_concurrent_root_successors() {
    let (store, history, metrics) = shared_history();
    let root = history.root_version().unwrap().id();

    let handles: Vec<_> = (0..WRITERS)
        .map(|_| {
            let store = store.clone();
            let history = history.clone();
            thread::spawn(move || {
                let mut overlay = TransactionalOverlay::new(store);
                (0..CHECKINS_PER_WRITER)
                    .map(|_| {
                        history
                            .checkin(&mut overlay, &[root], BTreeMap::new())
                            .unwrap()
                            .id()
                    })
                    .collect::<Vec<EntityId>>()
            })
        })
        .collect();

    let created: Vec<EntityId> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();

    let total = WRITERS * CHECKINS_PER_WRITER;
    assert_eq!(created.len(), total);
    assert_eq!(history.len().unwrap(), total + 1);
    assert_eq!(history.root_version().unwrap().successor_ids().len(), total);
    assert_eq!(metrics.snapshot().versions_created, total as u64);

    let names: HashSet<String> = history.version_names().unwrap().into_iter().collect();
    assert_eq!(names.len(), total + 1);

    let overlay = TransactionalOverlay::new(store);
    let report = history.verify(&overlay).unwrap();
    assert!(report.is_consistent(), "{:?}", report.problems);
}

/// Each writer grows its own branch while others grow theirs.
#[test]
fn test_concurrent_branches() {
    let (store, history, _metrics) = shared_history();
    let root = history.root_version().unwrap().id();

    let handles: Vec<_> = (0..WRITERS)
        .map(|_| {
            let store = store.clone();
            let history = history.clone();
            thread::spawn(move || {
                let mut overlay = TransactionalOverlay::new(store);
                let mut tip = root;
                for _ in 0..CHECKINS_PER_WRITER {
                    tip = history
                        .checkin(&mut overlay, &[tip], BTreeMap::new())
                        .unwrap()
                        .id();
                }
                tip
            })
        })
        .collect();

    let tips: Vec<EntityId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for tip in &tips {
        assert!(history.is_more_recent(tip, &root).unwrap());
        let mut steps = 0;
        let mut current = *tip;
        while let Some(pred) = history.linear_predecessor(&current).unwrap() {
            current = pred.id();
            steps += 1;
        }
        assert_eq!(current, root);
        assert_eq!(steps, CHECKINS_PER_WRITER);
    }
    for a in &tips {
        for b in &tips {
            if a != b {
                assert!(!history.is_more_recent(a, b).unwrap());
            }
        }
    }
}

/// Readers see a consistent graph while a writer is checking in.
#[test]
fn test_readers_during_checkin() {
    let (store, history, _metrics) = shared_history();
    let root = history.root_version().unwrap().id();

    let writer = {
        let store = store.clone();
        let history = history.clone();
        thread::spawn(move || {
            let mut overlay = TransactionalOverlay::new(store);
            let mut tip = root;
            for _ in 0..CHECKINS_PER_WRITER * WRITERS {
                tip = history
                    .checkin(&mut overlay, &[tip], BTreeMap::new())
                    .unwrap()
                    .id();
            }
        })
    };

    let readers: Vec<_> = (0..WRITERS)
        .map(|_| {
            let store = store.clone();
            let history = history.clone();
            thread::spawn(move || {
                let overlay = TransactionalOverlay::new(store);
                for _ in 0..CHECKINS_PER_WRITER {
                    let report = history.verify(&overlay).unwrap();
                    assert!(report.is_consistent(), "{:?}", report.problems);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(history.len().unwrap(), CHECKINS_PER_WRITER * WRITERS + 1);
}

// =============================================================================
// Transactions
// =============================================================================

/// Concurrent transactions on disjoint entities all commit.
#[test]
fn test_concurrent_disjoint_transactions() {
    let store = Arc::new(MemoryStateStore::new());

    let handles: Vec<_> = (0..WRITERS)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                let mut overlay = TransactionalOverlay::new(store);
                let mut txn = overlay.begin().unwrap();
                let mut log = ChangeLog::new();
                for _ in 0..CHECKINS_PER_WRITER {
                    log.added(EntityState::new(EntityId::new(), "node"));
                }
                txn.overlay_mut().update(log).unwrap();
                txn.commit().unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.len(), WRITERS * CHECKINS_PER_WRITER);
}
