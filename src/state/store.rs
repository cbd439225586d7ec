//! Shared state store
//!
//! The single mutable source of truth for committed entity states.
//!
//! # Design Principles
//!
//! - Reads return owned copies; callers never alias committed state
//! - Multi-entity updates are all-or-nothing under one write lock
//! - Referential integrity is checked again inside the atomic update
//! - Modification counts detect stale writers

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::change_log::ChangeLog;
use super::entity::{EntityState, NodeReferences};
use super::errors::{StateError, StateResult};
use super::EntityId;

/// Durable backing store of entity states.
///
/// Implementations must make `atomic_apply` safe under concurrent callers.
pub trait SharedStateStore: Send + Sync {
    /// Reads the committed state of an entity.
    fn read(&self, id: &EntityId) -> StateResult<EntityState>;

    /// Returns whether a committed state exists.
    fn has_item_state(&self, id: &EntityId) -> bool;

    /// Reads the committed references record of a target.
    fn read_references(&self, target: &EntityId) -> StateResult<NodeReferences>;

    /// Returns whether a committed references record exists.
    fn has_references(&self, target: &EntityId) -> bool;

    /// Validates the reference deltas of a pending log.
    fn check_referential_integrity(&self, log: &ChangeLog) -> StateResult<()>;

    /// Applies every entry of a pending log, or none of them.
    fn atomic_apply(&self, log: &ChangeLog) -> StateResult<()>;
}

/// Committed content of a memory store.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreContents {
    pub(crate) states: HashMap<EntityId, EntityState>,
    pub(crate) references: HashMap<EntityId, NodeReferences>,
}

impl StoreContents {
    /// Whether `id` will exist once `log` is applied.
    fn exists_after(&self, log: &ChangeLog, id: &EntityId) -> bool {
        match log.kind_of(id) {
            Some(super::ChangeKind::Deleted) => false,
            Some(_) => true,
            None => self.states.contains_key(id),
        }
    }

    fn references_after<'a>(
        &'a self,
        log: &'a ChangeLog,
        target: &EntityId,
    ) -> Option<&'a NodeReferences> {
        log.get_references(target)
            .or_else(|| self.references.get(target))
    }

    /// Integrity rules:
    /// - a deleted entity must not keep referrers that survive the log
    /// - a references record with referrers must target a surviving entity
    fn check_integrity(&self, log: &ChangeLog) -> StateResult<()> {
        for state in log.deleted_states() {
            let target = state.id();
            if let Some(refs) = self.references_after(log, &target) {
                let surviving = refs
                    .referrers()
                    .iter()
                    .filter(|referrer| self.exists_after(log, referrer))
                    .count();
                if surviving > 0 {
                    return Err(StateError::integrity(
                        target,
                        format!("cannot delete entity still referenced by {} item(s)", surviving),
                    ));
                }
            }
        }

        for refs in log.references() {
            if refs.has_references() && !self.exists_after(log, &refs.target()) {
                return Err(StateError::integrity(
                    refs.target(),
                    format!("{} reference(s) to missing target", refs.count()),
                ));
            }
        }

        Ok(())
    }

    fn check_consistency(&self, log: &ChangeLog) -> StateResult<()> {
        for state in log.added_states() {
            if self.states.contains_key(&state.id()) {
                return Err(StateError::consistency(state.id(), "added entity already exists"));
            }
        }
        for state in log.modified_states().into_iter().chain(log.deleted_states()) {
            let committed = self
                .states
                .get(&state.id())
                .ok_or_else(|| StateError::consistency(state.id(), "entity no longer exists"))?;
            if committed.mod_count() != state.mod_count() {
                return Err(StateError::consistency(
                    state.id(),
                    format!(
                        "stale state: modified at {} but store is at {}",
                        state.mod_count(),
                        committed.mod_count()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn apply(&mut self, log: &ChangeLog) {
        for state in log.added_states() {
            let mut state = state.clone();
            state.set_mod_count(0);
            self.states.insert(state.id(), state);
        }
        for state in log.modified_states() {
            let mut state = state.clone();
            state.set_mod_count(state.mod_count() + 1);
            self.states.insert(state.id(), state);
        }
        for state in log.deleted_states() {
            self.states.remove(&state.id());
        }
        for refs in log.references() {
            if refs.has_references() {
                self.references.insert(refs.target(), refs.clone());
            } else {
                self.references.remove(&refs.target());
            }
        }
    }
}

/// In-memory shared state store guarded by a reader/writer lock.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    contents: RwLock<StoreContents>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_contents(contents: StoreContents) -> Self {
        Self {
            contents: RwLock::new(contents),
        }
    }

    // `apply` never fails midway, so poisoned contents are still whole.
    pub(crate) fn read_contents(&self) -> RwLockReadGuard<'_, StoreContents> {
        self.contents.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_contents(&self) -> RwLockWriteGuard<'_, StoreContents> {
        self.contents.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of committed entities.
    pub fn len(&self) -> usize {
        self.read_contents().states.len()
    }

    /// True when no entity is committed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all committed entities, sorted.
    pub fn ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.read_contents().states.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl SharedStateStore for MemoryStateStore {
    fn read(&self, id: &EntityId) -> StateResult<EntityState> {
        self.read_contents()
            .states
            .get(id)
            .cloned()
            .ok_or(StateError::NotFound(*id))
    }

    fn has_item_state(&self, id: &EntityId) -> bool {
        self.read_contents().states.contains_key(id)
    }

    fn read_references(&self, target: &EntityId) -> StateResult<NodeReferences> {
        self.read_contents()
            .references
            .get(target)
            .cloned()
            .ok_or(StateError::ReferencesNotFound(*target))
    }

    fn has_references(&self, target: &EntityId) -> bool {
        self.read_contents().references.contains_key(target)
    }

    fn check_referential_integrity(&self, log: &ChangeLog) -> StateResult<()> {
        self.read_contents().check_integrity(log)
    }

    fn atomic_apply(&self, log: &ChangeLog) -> StateResult<()> {
        let mut contents = self.write_contents();
        contents.check_integrity(log)?;
        contents.check_consistency(log)?;
        contents.apply(log);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PropertyValue;

    fn committed(store: &MemoryStateStore, state: EntityState) -> EntityState {
        let mut log = ChangeLog::new();
        let id = state.id();
        log.added(state);
        store.atomic_apply(&log).unwrap();
        store.read(&id).unwrap()
    }

    #[test]
    fn test_added_entity_is_readable() {
        let store = MemoryStateStore::new();
        let id = EntityId::new();
        let state = committed(&store, EntityState::new(id, "node"));
        assert_eq!(state.mod_count(), 0);
        assert!(store.has_item_state(&id));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_modify_bumps_mod_count() {
        let store = MemoryStateStore::new();
        let mut state = committed(&store, EntityState::new(EntityId::new(), "node"));
        state.set_property("x", vec![PropertyValue::Long(1)]);

        let mut log = ChangeLog::new();
        log.modified(state.clone());
        store.atomic_apply(&log).unwrap();

        assert_eq!(store.read(&state.id()).unwrap().mod_count(), 1);
    }

    #[test]
    fn test_stale_modify_is_rejected() {
        let store = MemoryStateStore::new();
        let state = committed(&store, EntityState::new(EntityId::new(), "node"));

        let mut first = ChangeLog::new();
        first.modified(state.clone());
        store.atomic_apply(&first).unwrap();

        let mut second = ChangeLog::new();
        second.modified(state);
        let err = store.atomic_apply(&second).unwrap_err();
        assert!(matches!(err, StateError::ConsistencyViolation { .. }));
    }

    #[test]
    fn test_duplicate_add_is_rejected() {
        let store = MemoryStateStore::new();
        let state = committed(&store, EntityState::new(EntityId::new(), "node"));

        let mut log = ChangeLog::new();
        log.added(state);
        assert!(matches!(
            store.atomic_apply(&log),
            Err(StateError::ConsistencyViolation { .. })
        ));
    }

    #[test]
    fn test_failed_apply_changes_nothing() {
        let store = MemoryStateStore::new();
        let existing = committed(&store, EntityState::new(EntityId::new(), "node"));
        let fresh = EntityId::new();

        let mut log = ChangeLog::new();
        log.added(EntityState::new(fresh, "node"));
        log.added(existing);
        assert!(store.atomic_apply(&log).is_err());

        assert!(!store.has_item_state(&fresh));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_delete_of_referenced_entity_violates_integrity() {
        let store = MemoryStateStore::new();
        let target = EntityId::new();
        let referrer = EntityId::new();

        let mut setup = ChangeLog::new();
        setup.added(EntityState::new(target, "node"));
        setup.added(
            EntityState::new(referrer, "node")
                .with_property("ref", vec![PropertyValue::Reference(target)]),
        );
        let mut refs = NodeReferences::new(target);
        refs.add_referrer(referrer);
        setup.modified_references(refs);
        store.atomic_apply(&setup).unwrap();

        let mut delete = ChangeLog::new();
        delete.deleted(store.read(&target).unwrap());
        let err = store.check_referential_integrity(&delete).unwrap_err();
        assert!(matches!(err, StateError::IntegrityViolation { .. }));
    }

    #[test]
    fn test_delete_with_referrer_deleted_too_is_allowed() {
        let store = MemoryStateStore::new();
        let target = EntityId::new();
        let referrer = EntityId::new();

        let mut setup = ChangeLog::new();
        setup.added(EntityState::new(target, "node"));
        setup.added(EntityState::new(referrer, "node"));
        let mut refs = NodeReferences::new(target);
        refs.add_referrer(referrer);
        setup.modified_references(refs);
        store.atomic_apply(&setup).unwrap();

        let mut delete = ChangeLog::new();
        delete.deleted(store.read(&target).unwrap());
        delete.deleted(store.read(&referrer).unwrap());
        store.atomic_apply(&delete).unwrap();
        assert!(store.is_empty());
        assert!(!store.has_references(&target));
    }

    #[test]
    fn test_reference_to_missing_target_violates_integrity() {
        let store = MemoryStateStore::new();
        let mut refs = NodeReferences::new(EntityId::new());
        refs.add_referrer(EntityId::new());

        let mut log = ChangeLog::new();
        log.modified_references(refs);
        assert!(matches!(
            store.check_referential_integrity(&log),
            Err(StateError::IntegrityViolation { .. })
        ));
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let store = MemoryStateStore::new();
        let id = EntityId::new();
        assert!(matches!(store.read(&id), Err(StateError::NotFound(_))));
        assert!(matches!(
            store.read_references(&id),
            Err(StateError::ReferencesNotFound(_))
        ));
    }
}
