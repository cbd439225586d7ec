//! Change Log Invariant Tests
//!
//! Tests for:
//! - An entity sits in at most one of added/modified/deleted
//! - Add/delete pairs cancel when merged, in either order
//! - Undo after merge restores the observable pre-merge state
//! - Merge and undo never write to the backing store

use std::sync::Arc;

use versionvault::state::{
    ChangeKind, ChangeLog, EntityId, EntityState, MemoryStateStore, PropertyValue,
    SharedStateStore,
};
use versionvault::txn::{Scope, TransactionalOverlay};

// =============================================================================
// Test Utilities
// =============================================================================

fn titled(id: EntityId, title: &str) -> EntityState {
    EntityState::new(id, "node").with_property("title", vec![PropertyValue::String(title.into())])
}

fn title_of(state: &EntityState) -> String {
    state.property("title").unwrap()[0].as_str().unwrap().to_string()
}

fn store_with(states: &[EntityState]) -> Arc<MemoryStateStore> {
    let store = Arc::new(MemoryStateStore::new());
    let mut log = ChangeLog::new();
    for state in states {
        log.added(state.clone());
    }
    store.atomic_apply(&log).unwrap();
    store
}

// =============================================================================
// Merge Cancellation
// =============================================================================

/// An entity added in one log and deleted in the next is absent after merge.
#[test]
fn test_added_then_deleted_cancels() {
    let id = EntityId::new();
    let mut a = ChangeLog::new();
    a.added(titled(id, "draft"));
    let mut b = ChangeLog::new();
    b.deleted(titled(id, "draft"));

    a.merge(b);
    assert!(a.is_empty());
    assert_eq!(a.kind_of(&id), None);
}

/// Cancellation also holds when the delete was recorded first.
#[test]
fn test_deleted_then_added_cancels() {
    let id = EntityId::new();
    let mut a = ChangeLog::new();
    a.deleted(titled(id, "old"));
    let mut b = ChangeLog::new();
    b.added(titled(id, "new"));

    a.merge(b);
    assert_eq!(a.len(), 0);
}

/// Committing a merged add/delete pair leaves the store without the entity.
#[test]
fn test_cancelled_pair_commits_nothing() {
    let store = Arc::new(MemoryStateStore::new());
    let id = EntityId::new();
    let mut a = ChangeLog::new();
    a.added(titled(id, "transient"));
    let mut b = ChangeLog::new();
    b.deleted(titled(id, "transient"));
    a.merge(b);

    store.atomic_apply(&a).unwrap();
    assert!(!store.has_item_state(&id));
    assert!(store.is_empty());
}

// =============================================================================
// Classification
// =============================================================================

/// Every entity ends up with exactly one classification.
#[test]
fn test_each_entity_has_one_classification() {
    let (x, y, z) = (EntityId::new(), EntityId::new(), EntityId::new());
    let mut log = ChangeLog::new();
    log.added(titled(x, "x"));
    log.modified(titled(x, "x2"));
    log.modified(titled(y, "y"));
    log.deleted(titled(y, "y"));
    log.deleted(titled(z, "z"));
    log.modified(titled(z, "z2"));

    assert_eq!(log.kind_of(&x), Some(ChangeKind::Added));
    assert_eq!(log.kind_of(&y), Some(ChangeKind::Deleted));
    assert_eq!(log.kind_of(&z), Some(ChangeKind::Modified));

    let total =
        log.added_states().len() + log.modified_states().len() + log.deleted_states().len();
    assert_eq!(total, log.len());
    assert_eq!(title_of(log.get(&x).unwrap()), "x2");
}

/// Modify followed by modify keeps the latest state.
#[test]
fn test_latest_modification_wins_across_merge() {
    let id = EntityId::new();
    let mut a = ChangeLog::new();
    a.modified(titled(id, "first"));
    let mut b = ChangeLog::new();
    b.modified(titled(id, "second"));

    a.merge(b);
    assert_eq!(title_of(a.get(&id).unwrap()), "second");
}

// =============================================================================
// Undo
// =============================================================================

/// Undo after merge makes reads observe the committed state again.
#[test]
fn test_undo_after_merge_restores_reads() {
    let id = EntityId::new();
    let added = EntityId::new();
    let store = store_with(&[titled(id, "committed")]);
    let mut overlay = TransactionalOverlay::new(store.clone());
    overlay.set_change_log(Some(ChangeLog::new()), Scope::Transaction);

    let mut edit = ChangeLog::new();
    edit.modified(titled(id, "pending"));
    edit.added(titled(added, "new"));
    overlay.update(edit).unwrap();
    assert_eq!(title_of(&overlay.get_item_state(&id).unwrap()), "pending");
    assert!(overlay.has_item_state(&added));

    let mut log = overlay.set_change_log(None, Scope::Transaction).unwrap();
    let invalidated = log.undo(&*store);
    overlay.set_change_log(Some(log), Scope::Transaction);

    assert_eq!(invalidated, vec![id]);
    assert_eq!(title_of(&overlay.get_item_state(&id).unwrap()), "committed");
    assert!(!overlay.has_item_state(&added));
}

/// Merge and undo leave the backing store untouched.
#[test]
fn test_merge_and_undo_do_not_write() {
    let id = EntityId::new();
    let store = store_with(&[titled(id, "committed")]);
    let before = store.read(&id).unwrap();

    let mut log = ChangeLog::new();
    log.deleted(before.clone());
    let mut other = ChangeLog::new();
    other.added(titled(EntityId::new(), "other"));
    log.merge(other);
    log.undo(&*store);

    assert_eq!(store.read(&id).unwrap(), before);
    assert_eq!(store.len(), 1);
    assert!(log.is_empty());
}
