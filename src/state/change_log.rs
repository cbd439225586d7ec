//! ChangeLog - Ordered, mergeable set of pending entity mutations
//!
//! A change log buffers added, modified and deleted entity states plus
//! modified `NodeReferences` records until they are applied to a shared
//! state store in one atomic update.
//!
//! # Invariants
//!
//! - An entity appears in at most one of added/modified/deleted
//! - An add followed by a delete (or a delete followed by an add) of the
//!   same entity cancels out and leaves no entry
//! - Merge, undo and reset never write to the backing store

use std::collections::{BTreeMap, HashMap};

use super::entity::{EntityState, NodeReferences};
use super::store::SharedStateStore;
use super::EntityId;
use crate::observability::{Event, Logger, log_event_with_fields};

/// Classification of a pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Entity is new and not yet in the store
    Added,
    /// Entity exists in the store and will be replaced
    Modified,
    /// Entity exists in the store and will be removed
    Deleted,
}

/// Result of looking an entity up in a change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending<'a> {
    /// Added or modified; this is the pending state
    Present(&'a EntityState),
    /// Deleted by this log
    Deleted,
    /// Not touched by this log
    Absent,
}

#[derive(Debug, Clone)]
struct Entry {
    kind: ChangeKind,
    state: EntityState,
    seq: u64,
}

/// Buffered set of pending mutations not yet durably committed.
#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    entries: HashMap<EntityId, Entry>,
    references: BTreeMap<EntityId, NodeReferences>,
    next_seq: u64,
}

impl ChangeLog {
    /// Creates an empty change log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly created entity.
    pub fn added(&mut self, state: EntityState) {
        self.fold(ChangeKind::Added, state);
    }

    /// Records a modification of an existing entity.
    pub fn modified(&mut self, state: EntityState) {
        self.fold(ChangeKind::Modified, state);
    }

    /// Records a deletion of an existing entity.
    pub fn deleted(&mut self, state: EntityState) {
        self.fold(ChangeKind::Deleted, state);
    }

    /// Records a new references record for its target, replacing any pending one.
    pub fn modified_references(&mut self, refs: NodeReferences) {
        self.references.insert(refs.target(), refs);
    }

    /// Folds one mutation into the log using the merge policy:
    ///
    /// | pending  | incoming | result            |
    /// |----------|----------|-------------------|
    /// | -        | k        | k                 |
    /// | Added    | Deleted  | entry removed     |
    /// | Deleted  | Added    | entry removed     |
    /// | Added    | other    | Added, new state  |
    /// | Modified | Deleted  | Deleted           |
    /// | Modified | other    | Modified, new state |
    /// | Deleted  | Modified | Modified          |
    /// | Deleted  | Deleted  | Deleted           |
    fn fold(&mut self, kind: ChangeKind, state: EntityState) {
        let id = state.id();
        let Some(entry) = self.entries.get_mut(&id) else {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.entries.insert(id, Entry { kind, state, seq });
            return;
        };

        use ChangeKind::*;
        let next = match (entry.kind, kind) {
            (Added, Deleted) | (Deleted, Added) => None,
            (Added, _) => Some(Added),
            (Modified, Deleted) => Some(Deleted),
            (Modified, _) => Some(Modified),
            (Deleted, Modified) => Some(Modified),
            (Deleted, Deleted) => Some(Deleted),
        };

        match next {
            Some(next) => {
                entry.kind = next;
                entry.state = state;
            }
            None => {
                self.entries.remove(&id);
            }
        }
    }

    /// Returns the pending state of an added or modified entity.
    ///
    /// Deleted entities and untouched entities both yield `None`; use
    /// `lookup` to tell them apart.
    pub fn get(&self, id: &EntityId) -> Option<&EntityState> {
        match self.lookup(id) {
            Pending::Present(state) => Some(state),
            _ => None,
        }
    }

    /// Looks an entity up without falling through to any store.
    pub fn lookup(&self, id: &EntityId) -> Pending<'_> {
        match self.entries.get(id) {
            Some(Entry {
                kind: ChangeKind::Deleted,
                ..
            }) => Pending::Deleted,
            Some(entry) => Pending::Present(&entry.state),
            None => Pending::Absent,
        }
    }

    /// Returns how this log classifies an entity.
    pub fn kind_of(&self, id: &EntityId) -> Option<ChangeKind> {
        self.entries.get(id).map(|entry| entry.kind)
    }

    /// Returns whether the entity is deleted by this log.
    pub fn is_deleted(&self, id: &EntityId) -> bool {
        self.kind_of(id) == Some(ChangeKind::Deleted)
    }

    /// Returns the pending references record for a target.
    pub fn get_references(&self, target: &EntityId) -> Option<&NodeReferences> {
        self.references.get(target)
    }

    fn states_of(&self, kind: ChangeKind) -> Vec<&EntityState> {
        let mut entries: Vec<&Entry> = self
            .entries
            .values()
            .filter(|entry| entry.kind == kind)
            .collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| &entry.state).collect()
    }

    /// Added states in recording order.
    pub fn added_states(&self) -> Vec<&EntityState> {
        self.states_of(ChangeKind::Added)
    }

    /// Modified states in recording order.
    pub fn modified_states(&self) -> Vec<&EntityState> {
        self.states_of(ChangeKind::Modified)
    }

    /// Deleted states in recording order.
    pub fn deleted_states(&self) -> Vec<&EntityState> {
        self.states_of(ChangeKind::Deleted)
    }

    /// Pending references records, ordered by target.
    pub fn references(&self) -> impl Iterator<Item = &NodeReferences> {
        self.references.values()
    }

    /// Number of pending entity entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when neither entity entries nor references records are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.references.is_empty()
    }

    /// Incorporates all of `other`'s entries into this log.
    ///
    /// Entries of `other` are folded in their recording order, so each
    /// entity's net classification follows the table on `fold`.
    pub fn merge(&mut self, other: ChangeLog) {
        let mut incoming: Vec<Entry> = other.entries.into_values().collect();
        incoming.sort_by_key(|entry| entry.seq);
        for entry in incoming {
            self.fold(entry.kind, entry.state);
        }
        self.references.extend(other.references);
    }

    /// Discards every pending entry.
    ///
    /// Added entries never reached the store and are dropped outright.
    /// Modified and deleted entries are dropped so that the next read
    /// re-fetches authoritative state from `store`; their ids are returned
    /// so callers can invalidate anything derived from them.
    pub fn undo<S: SharedStateStore + ?Sized>(&mut self, store: &S) -> Vec<EntityId> {
        let mut invalidated: Vec<(u64, EntityId)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.kind != ChangeKind::Added)
            .map(|(id, entry)| (entry.seq, *id))
            .collect();
        invalidated.sort();
        let invalidated: Vec<EntityId> = invalidated.into_iter().map(|(_, id)| id).collect();

        for id in &invalidated {
            if !store.has_item_state(id) {
                Logger::warn(
                    Event::ChangeLogUndoVanished.as_str(),
                    &[("entity_id", &id.to_string())],
                );
            }
        }

        let discarded = self.entries.len().to_string();
        let refetch = invalidated.len().to_string();
        self.reset();
        log_event_with_fields(
            Event::ChangeLogUndo,
            &[("discarded", &discarded), ("refetch", &refetch)],
        );

        invalidated
    }

    /// Clears all entries so the log can be reused.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.references.clear();
        self.next_seq = 0;
    }
}
