//! GraphEdit - a batch of version graph mutations
//!
//! Collects entity mutations in a local change log. Reads see the batch
//! first and fall through to the item state manager, so consecutive
//! edits within one batch compose. The finished log is handed to the
//! manager in a single `update`.

use crate::state::{ChangeKind, ChangeLog, EntityId, EntityState, NodeReferences, Pending};
use crate::state::{StateError, StateResult};
use crate::txn::ItemStateManager;

pub(crate) struct GraphEdit<'m, M: ItemStateManager + ?Sized> {
    manager: &'m M,
    log: ChangeLog,
}

impl<'m, M: ItemStateManager + ?Sized> GraphEdit<'m, M> {
    pub(crate) fn new(manager: &'m M) -> Self {
        Self {
            manager,
            log: ChangeLog::new(),
        }
    }

    pub(crate) fn get(&self, id: &EntityId) -> StateResult<EntityState> {
        match self.log.lookup(id) {
            Pending::Present(state) => Ok(state.clone()),
            Pending::Deleted => Err(StateError::NotFound(*id)),
            Pending::Absent => self.manager.get_item_state(id),
        }
    }

    pub(crate) fn exists(&self, id: &EntityId) -> bool {
        match self.log.lookup(id) {
            Pending::Present(_) => true,
            Pending::Deleted => false,
            Pending::Absent => self.manager.has_item_state(id),
        }
    }

    /// References record of `target`; empty if none exists yet.
    pub(crate) fn references(&self, target: &EntityId) -> StateResult<NodeReferences> {
        if let Some(refs) = self.log.get_references(target) {
            return Ok(refs.clone());
        }
        if self.manager.has_node_references(target) {
            self.manager.get_node_references(target)
        } else {
            Ok(NodeReferences::new(*target))
        }
    }

    pub(crate) fn add(&mut self, state: EntityState) {
        self.log.added(state);
    }

    /// Records `state` as changed. Entities added by this batch stay added.
    pub(crate) fn store(&mut self, state: EntityState) {
        match self.log.kind_of(&state.id()) {
            Some(ChangeKind::Added) => self.log.added(state),
            _ => self.log.modified(state),
        }
    }

    pub(crate) fn delete(&mut self, state: EntityState) {
        self.log.deleted(state);
    }

    pub(crate) fn add_reference(&mut self, referrer: EntityId, target: EntityId) -> StateResult<()> {
        let mut refs = self.references(&target)?;
        refs.add_referrer(referrer);
        self.log.modified_references(refs);
        Ok(())
    }

    pub(crate) fn remove_reference(
        &mut self,
        referrer: EntityId,
        target: EntityId,
    ) -> StateResult<()> {
        let mut refs = self.references(&target)?;
        refs.remove_referrer(&referrer);
        self.log.modified_references(refs);
        Ok(())
    }

    pub(crate) fn finish(self) -> ChangeLog {
        self.log
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::state::{MemoryStateStore, PropertyValue};
    use crate::txn::TransactionalOverlay;

    #[test]
    fn test_reads_see_batch_first() {
        let mut overlay = TransactionalOverlay::new(Arc::new(MemoryStateStore::new()));
        let id = EntityId::new();
        let mut setup = ChangeLog::new();
        setup.added(EntityState::new(id, "node"));
        overlay.update(setup).unwrap();

        let mut edit = GraphEdit::new(&overlay);
        let mut state = edit.get(&id).unwrap();
        state.set_property("title", vec![PropertyValue::String("edited".into())]);
        edit.store(state);

        assert!(edit.get(&id).unwrap().has_property("title"));
        assert!(!overlay.get_item_state(&id).unwrap().has_property("title"));
    }

    #[test]
    fn test_store_keeps_added_entities_added() {
        let overlay = TransactionalOverlay::new(Arc::new(MemoryStateStore::new()));
        let id = EntityId::new();

        let mut edit = GraphEdit::new(&overlay);
        edit.add(EntityState::new(id, "node"));
        let state = edit.get(&id).unwrap();
        edit.store(state);

        assert_eq!(edit.finish().kind_of(&id), Some(ChangeKind::Added));
    }

    #[test]
    fn test_reference_counting() {
        let overlay = TransactionalOverlay::new(Arc::new(MemoryStateStore::new()));
        let (referrer, target) = (EntityId::new(), EntityId::new());

        let mut edit = GraphEdit::new(&overlay);
        edit.add_reference(referrer, target).unwrap();
        edit.add_reference(referrer, target).unwrap();
        edit.remove_reference(referrer, target).unwrap();
        assert!(!edit.exists(&target));
        assert_eq!(edit.references(&target).unwrap().count(), 1);
    }
}
