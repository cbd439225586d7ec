//! Version - one node of a version graph
//!
//! A `Version` mirrors the persisted state of its version entity. It is
//! immutable apart from its edge lists (rewritten by graph edits) and its
//! label cache. The owning history is held by id only; the history arena
//! is the single owner of every `Version`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::state::{EntityId, EntityState, PropertyValue};

use super::errors::{VersionError, VersionResult};
use super::names;

/// A version of a versionable item.
#[derive(Debug, Clone)]
pub struct Version {
    id: EntityId,
    name: String,
    created: DateTime<Utc>,
    is_root: bool,
    history: EntityId,
    frozen_node: EntityId,
    predecessors: Vec<EntityId>,
    successors: Vec<EntityId>,
    labels: Option<BTreeSet<String>>,
}

impl Version {
    /// Builds a version from its persisted entity state.
    ///
    /// Fails with `Structural` if the state is not a version of `history`
    /// or lacks its name, creation date or frozen node.
    pub fn from_state(state: &EntityState, history: EntityId) -> VersionResult<Self> {
        let id = state.id();
        if state.kind() != names::VERSION_KIND {
            return Err(VersionError::structural(
                id,
                format!("expected a version, found '{}'", state.kind()),
            ));
        }

        let owner = single(state, names::VERSION_HISTORY).and_then(PropertyValue::as_id);
        if owner != Some(history) {
            return Err(VersionError::structural(id, "version belongs to another history"));
        }

        let name = single(state, names::VERSION_NAME)
            .and_then(PropertyValue::as_str)
            .ok_or_else(|| VersionError::structural(id, "version has no name"))?
            .to_string();
        let created = single(state, names::CREATED)
            .and_then(PropertyValue::as_date)
            .ok_or_else(|| VersionError::structural(id, "version has no creation date"))?;
        let frozen_node = state
            .child(names::FROZEN_NODE)
            .map(|entry| entry.id)
            .ok_or_else(|| VersionError::structural(id, "version has no frozen node"))?;

        Ok(Self {
            id,
            is_root: name == names::ROOT_VERSION_NAME,
            name,
            created,
            history,
            frozen_node,
            predecessors: edge_ids(state, names::PREDECESSORS),
            successors: edge_ids(state, names::SUCCESSORS),
            labels: None,
        })
    }

    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// The owning history.
    pub fn history_id(&self) -> EntityId {
        self.history
    }

    pub fn frozen_node_id(&self) -> EntityId {
        self.frozen_node
    }

    pub fn predecessor_ids(&self) -> &[EntityId] {
        &self.predecessors
    }

    pub fn successor_ids(&self) -> &[EntityId] {
        &self.successors
    }

    /// The leftmost predecessor; `None` for the root.
    pub fn linear_predecessor_id(&self) -> Option<EntityId> {
        self.predecessors.first().copied()
    }

    /// Adds a label to the cache. Does not touch storage.
    pub fn add_label(&mut self, label: &str) -> bool {
        self.labels
            .get_or_insert_with(BTreeSet::new)
            .insert(label.to_string())
    }

    /// Removes a label from the cache. Does not touch storage.
    pub fn remove_label(&mut self, label: &str) -> bool {
        self.labels
            .as_mut()
            .map_or(false, |labels| labels.remove(label))
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels
            .as_ref()
            .map_or(false, |labels| labels.contains(label))
    }

    /// Cached labels in name order.
    pub fn labels(&self) -> Vec<String> {
        self.labels
            .as_ref()
            .map(|labels| labels.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops the label cache.
    pub fn clear(&mut self) {
        self.labels = None;
    }

    pub(crate) fn take_labels(&mut self) -> Option<BTreeSet<String>> {
        self.labels.take()
    }

    pub(crate) fn restore_labels(&mut self, labels: Option<BTreeSet<String>>) {
        self.labels = labels;
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Version {}

fn single<'a>(state: &'a EntityState, name: &str) -> Option<&'a PropertyValue> {
    state.property(name).and_then(|values| values.first())
}

/// Reads an edge list property; missing means no edges.
pub(crate) fn edge_ids(state: &EntityState, name: &str) -> Vec<EntityId> {
    state
        .property(name)
        .map(|values| values.iter().filter_map(PropertyValue::as_id).collect())
        .unwrap_or_default()
}

/// Encodes an edge list as weak references.
pub(crate) fn edge_values(ids: &[EntityId]) -> Vec<PropertyValue> {
    ids.iter().copied().map(PropertyValue::WeakReference).collect()
}
