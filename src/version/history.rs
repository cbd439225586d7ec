//! VersionHistory - arena of versions and the graph algorithms over it
//!
//! The history is the only owner of `Version` records and the only way to
//! resolve an id to a version. Edges are id lists persisted as weak
//! references on each version entity; the arena mirrors them in memory.
//!
//! # Locking
//!
//! One reader/writer lock guards the committed arena. Navigation
//! (predecessors and successors alike) holds the shared lock for the whole
//! resolution. Direct mutations hold the exclusive lock around the full
//! splice: the batch is built, handed to the item state manager, and
//! absorbed into the arena before the lock is released.
//!
//! # Transactions
//!
//! The committed arena only ever holds changes the shared store accepted.
//! Mutations made through a manager that buffers them in a transaction are
//! absorbed into an arena staged for that transaction alone, and the
//! history enlists in it. On commit the staged deltas are replayed onto the
//! committed arena; on rollback they are dropped.
//!
//! Lock order: staged table, then committed arena.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use uuid::Uuid;

use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::state::{ChangeLog, EntityId, EntityState, PropertyValue};
use crate::txn::{ItemStateManager, TransactionResource, UpdatableStateManager};

use super::edit::GraphEdit;
use super::errors::{VersionError, VersionResult};
use super::names;
use super::naming::{naming_base, next_version_name};
use super::record::{edge_ids, edge_values, Version};

/// In-memory index of one history's versions.
#[derive(Debug, Clone)]
pub(crate) struct Arena {
    pub(crate) root: EntityId,
    pub(crate) versions: HashMap<EntityId, Version>,
    pub(crate) names: BTreeMap<String, EntityId>,
    pub(crate) labels: BTreeMap<String, EntityId>,
}

impl Arena {
    fn load<M: ItemStateManager + ?Sized>(manager: &M, history: EntityId) -> VersionResult<Self> {
        let state = manager.get_item_state(&history)?;
        if state.kind() != names::HISTORY_KIND {
            return Err(VersionError::structural(
                history,
                format!("expected a version history, found '{}'", state.kind()),
            ));
        }
        let root = root_of(&state)
            .ok_or_else(|| VersionError::structural(history, "history has no root version"))?;

        let mut versions = HashMap::new();
        let mut version_names = BTreeMap::new();
        for child in state.children() {
            let version = Version::from_state(&manager.get_item_state(&child.id)?, history)?;
            version_names.insert(version.name().to_string(), version.id());
            versions.insert(version.id(), version);
        }
        if !versions.contains_key(&root) {
            return Err(VersionError::structural(history, "root version is not a child"));
        }

        let labels = labels_of(&state);
        for (label, target) in &labels {
            let version = versions.get_mut(target).ok_or_else(|| {
                VersionError::structural(history, format!("label '{}' targets a foreign version", label))
            })?;
            version.add_label(label);
        }

        Ok(Self {
            root,
            versions,
            names: version_names,
            labels,
        })
    }

    pub(crate) fn get(&self, id: &EntityId) -> VersionResult<&Version> {
        self.versions
            .get(id)
            .ok_or_else(|| VersionError::NotFound(id.to_string()))
    }

    fn resolve(&self, ids: &[EntityId]) -> VersionResult<Vec<Version>> {
        ids.iter().map(|id| self.get(id).cloned()).collect()
    }

    /// Versions in name order.
    pub(crate) fn ordered(&self) -> impl Iterator<Item = &Version> {
        self.names.values().filter_map(|id| self.versions.get(id))
    }

    fn absorb(&mut self, delta: Delta) {
        for id in delta.removals {
            if let Some(version) = self.versions.remove(&id) {
                self.names.remove(version.name());
            }
        }

        for mut version in delta.upserts {
            if let Some(previous) = self.versions.get_mut(&version.id()) {
                version.restore_labels(previous.take_labels());
            }
            self.names.insert(version.name().to_string(), version.id());
            self.versions.insert(version.id(), version);
        }

        if let Some(history) = delta.history {
            let labels = labels_of(&history);
            for (label, previous) in &self.labels {
                if labels.get(label) != Some(previous) {
                    if let Some(version) = self.versions.get_mut(previous) {
                        version.remove_label(label);
                    }
                }
            }
            for (label, target) in &labels {
                if self.labels.get(label) != Some(target) {
                    if let Some(version) = self.versions.get_mut(target) {
                        version.add_label(label);
                    }
                }
            }
            self.labels = labels;
            if let Some(root) = root_of(&history) {
                self.root = root;
            }
        }
    }
}

/// Arena changes derived from a finished batch.
#[derive(Debug, Clone)]
struct Delta {
    upserts: Vec<Version>,
    removals: Vec<EntityId>,
    history: Option<EntityState>,
}

impl Delta {
    fn of(log: &ChangeLog, history: EntityId) -> VersionResult<Self> {
        let mut upserts = Vec::new();
        let mut history_state = None;
        for state in log.added_states().into_iter().chain(log.modified_states()) {
            if state.id() == history {
                history_state = Some(state.clone());
            } else if state.kind() == names::VERSION_KIND {
                upserts.push(Version::from_state(state, history)?);
            }
        }

        let removals = log
            .deleted_states()
            .into_iter()
            .filter(|state| state.kind() == names::VERSION_KIND)
            .map(EntityState::id)
            .collect();

        Ok(Self {
            upserts,
            removals,
            history: history_state,
        })
    }
}

fn root_of(history: &EntityState) -> Option<EntityId> {
    history
        .property(names::ROOT_VERSION)
        .and_then(|values| values.first())
        .and_then(PropertyValue::as_id)
}

fn labels_of(history: &EntityState) -> BTreeMap<String, EntityId> {
    history
        .properties()
        .filter_map(|(name, values)| {
            let label = name.strip_prefix(names::LABEL_PREFIX)?;
            let target = values.first()?.as_id()?;
            Some((label.to_string(), target))
        })
        .collect()
}

fn version_state(
    id: EntityId,
    history: EntityId,
    name: &str,
    predecessors: &[EntityId],
    frozen_node: EntityId,
) -> EntityState {
    EntityState::new(id, names::VERSION_KIND)
        .with_property(names::VERSION_NAME, vec![PropertyValue::Name(name.to_string())])
        .with_property(names::CREATED, vec![PropertyValue::Date(Utc::now())])
        .with_property(names::VERSION_HISTORY, vec![PropertyValue::WeakReference(history)])
        .with_property(names::PREDECESSORS, edge_values(predecessors))
        .with_property(names::SUCCESSORS, Vec::new())
        .with_child(names::FROZEN_NODE, frozen_node)
}

fn read_edges<M: ItemStateManager + ?Sized>(
    edit: &GraphEdit<'_, M>,
    id: &EntityId,
    edge: &str,
) -> VersionResult<(EntityState, Vec<EntityId>)> {
    let state = edit.get(id)?;
    let ids = edge_ids(&state, edge);
    Ok((state, ids))
}

fn write_edges<M: ItemStateManager + ?Sized>(
    edit: &mut GraphEdit<'_, M>,
    mut state: EntityState,
    edge: &str,
    ids: &[EntityId],
) {
    state.set_property(edge, edge_values(ids));
    edit.store(state);
}

/// Adds `id` to the successor list of each of its predecessors.
///
/// Returns the number of edges added; existing edges are kept as is.
fn attach_in<M: ItemStateManager + ?Sized>(
    edit: &mut GraphEdit<'_, M>,
    id: &EntityId,
) -> VersionResult<usize> {
    let (_, predecessors) = read_edges(edit, id, names::PREDECESSORS)?;
    let mut added = 0;
    for pred in predecessors {
        let (state, mut successors) = read_edges(edit, &pred, names::SUCCESSORS)?;
        if !successors.contains(id) {
            successors.push(*id);
            write_edges(edit, state, names::SUCCESSORS, &successors);
            added += 1;
        }
    }
    Ok(added)
}

/// Removes every edge pointing at `id` from its neighbours.
///
/// The neighbours are not reconnected and `id`'s own lists are untouched.
fn detach_in<M: ItemStateManager + ?Sized>(
    edit: &mut GraphEdit<'_, M>,
    id: &EntityId,
) -> VersionResult<()> {
    let (state, successors) = read_edges(edit, id, names::SUCCESSORS)?;
    let predecessors = edge_ids(&state, names::PREDECESSORS);

    for (neighbours, edge) in [
        (successors, names::PREDECESSORS),
        (predecessors, names::SUCCESSORS),
    ] {
        for neighbour in neighbours {
            let (state, mut list) = read_edges(edit, &neighbour, edge)?;
            let before = list.len();
            list.retain(|e| e != id);
            if list.len() != before {
                write_edges(edit, state, edge, &list);
            }
        }
    }
    Ok(())
}

/// Replaces `removed` in `id`'s `edge` list by `removed`'s own `edge` list,
/// at the same position and without duplicates.
///
/// Returns false if `removed` was not in the list.
fn collapse_in<M: ItemStateManager + ?Sized>(
    edit: &mut GraphEdit<'_, M>,
    id: &EntityId,
    removed: &EntityId,
    edge: &str,
) -> VersionResult<bool> {
    let (state, mut list) = read_edges(edit, id, edge)?;
    let Some(pos) = list.iter().position(|e| e == removed) else {
        return Ok(false);
    };

    let (_, inherited) = read_edges(edit, removed, edge)?;
    let mut replacement: Vec<EntityId> = Vec::with_capacity(inherited.len());
    for candidate in inherited {
        if candidate != *id && !list.contains(&candidate) && !replacement.contains(&candidate) {
            replacement.push(candidate);
        }
    }

    list.splice(pos..=pos, replacement);
    write_edges(edit, state, edge, &list);
    Ok(true)
}

/// Graph changes made by one open transaction.
#[derive(Debug)]
struct Staged {
    arena: Arena,
    deltas: Vec<Delta>,
}

/// Committed arena and the arenas staged by open transactions.
#[derive(Debug)]
struct HistoryState {
    id: EntityId,
    committed: RwLock<Arena>,
    staged: Mutex<HashMap<Uuid, Staged>>,
}

impl HistoryState {
    fn take_staged(&self, txn: Uuid) -> Option<Staged> {
        self.staged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&txn)
    }
}

impl TransactionResource for HistoryState {
    fn commit(&self, txn: Uuid) {
        let Some(staged) = self.take_staged(txn) else {
            return;
        };
        let edits = staged.deltas.len().to_string();
        let mut arena = self
            .committed
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for delta in staged.deltas {
            arena.absorb(delta);
        }
        log_event_with_fields(
            Event::HistoryStagePublished,
            &[
                ("history_id", &self.id.to_string()),
                ("txn_id", &txn.to_string()),
                ("edits", &edits),
            ],
        );
    }

    fn rollback(&self, txn: Uuid) {
        if let Some(staged) = self.take_staged(txn) {
            log_event_with_fields(
                Event::HistoryStageDiscarded,
                &[
                    ("history_id", &self.id.to_string()),
                    ("txn_id", &txn.to_string()),
                    ("edits", &staged.deltas.len().to_string()),
                ],
            );
        }
    }
}

/// Builds one batch against `arena` and hands it to the manager.
///
/// Returns the builder's output and the arena changes the batch implies.
fn run_edit<M, T>(
    arena: &Arena,
    manager: &mut M,
    history: EntityId,
    build: impl FnOnce(&Arena, &mut GraphEdit<'_, M>) -> VersionResult<T>,
) -> VersionResult<(T, Delta)>
where
    M: UpdatableStateManager + ?Sized,
{
    let mut edit = GraphEdit::new(&*manager);
    let out = build(arena, &mut edit)?;
    let log = edit.finish();
    let delta = Delta::of(&log, history)?;
    manager.update(log)?;
    Ok((out, delta))
}

/// A version history: the set of versions of one versionable item.
#[derive(Debug)]
pub struct VersionHistory {
    id: EntityId,
    state: Arc<HistoryState>,
    max_walk_factor: usize,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl VersionHistory {
    /// Creates a history holding only its root version.
    ///
    /// The history entity, root version and root frozen node are written
    /// in one update.
    pub fn create<M: UpdatableStateManager + ?Sized>(manager: &mut M) -> VersionResult<Self> {
        let history = EntityId::new();
        let root = EntityId::new();
        let frozen = EntityId::new();

        let mut edit = GraphEdit::new(&*manager);
        edit.add(
            EntityState::new(history, names::HISTORY_KIND)
                .with_property(names::ROOT_VERSION, vec![PropertyValue::WeakReference(root)])
                .with_child(names::ROOT_VERSION_NAME, root),
        );
        edit.add(version_state(root, history, names::ROOT_VERSION_NAME, &[], frozen));
        edit.add(EntityState::new(frozen, names::FROZEN_NODE_KIND));
        let log = edit.finish();
        manager.update(log)?;

        log_event_with_fields(
            Event::HistoryCreated,
            &[("history_id", &history.to_string()), ("root_id", &root.to_string())],
        );
        Self::load(&*manager, history)
    }

    /// Builds the arena of an existing history from persisted state.
    pub fn load<M: ItemStateManager + ?Sized>(manager: &M, id: EntityId) -> VersionResult<Self> {
        let state = HistoryState {
            id,
            committed: RwLock::new(Arena::load(manager, id)?),
            staged: Mutex::new(HashMap::new()),
        };
        Ok(Self {
            id,
            state: Arc::new(state),
            max_walk_factor: 1,
            metrics: None,
        })
    }

    /// Bounds linear walks to `factor * version count + 1` steps.
    pub fn with_max_walk_factor(mut self, factor: usize) -> Self {
        self.max_walk_factor = factor.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Discards the committed arena and every label cache, then rebuilds
    /// them from persisted state as `manager` sees it.
    ///
    /// Arenas staged by open transactions are left alone.
    pub fn reload<M: ItemStateManager + ?Sized>(&self, manager: &M) -> VersionResult<()> {
        let fresh = Arena::load(manager, self.id)?;
        let mut arena = self.write()?;
        *arena = fresh;
        let count = arena.versions.len().to_string();
        log_event_with_fields(
            Event::HistoryReloaded,
            &[("history_id", &self.id.to_string()), ("versions", &count)],
        );
        Ok(())
    }

    pub(crate) fn read(&self) -> VersionResult<RwLockReadGuard<'_, Arena>> {
        self.state.committed.read().map_err(|_| VersionError::LockPoisoned)
    }

    fn write(&self) -> VersionResult<RwLockWriteGuard<'_, Arena>> {
        self.state.committed.write().map_err(|_| VersionError::LockPoisoned)
    }

    fn staged(&self) -> VersionResult<MutexGuard<'_, HashMap<Uuid, Staged>>> {
        self.state.staged.lock().map_err(|_| VersionError::LockPoisoned)
    }

    /// Runs one batch of graph mutations and absorbs it once the manager
    /// accepted it.
    ///
    /// Without a transaction the batch lands in the committed arena under
    /// its exclusive lock. Inside one it lands in the arena staged for that
    /// transaction, created from the committed arena on first use.
    fn apply_edit<M, T>(
        &self,
        manager: &mut M,
        build: impl FnOnce(&Arena, &mut GraphEdit<'_, M>) -> VersionResult<T>,
    ) -> VersionResult<T>
    where
        M: UpdatableStateManager + ?Sized,
    {
        let Some(txn) = manager.transaction_id() else {
            let mut arena = self.write()?;
            let (out, delta) = run_edit(&arena, manager, self.id, build)?;
            arena.absorb(delta);
            return Ok(out);
        };

        let mut staged = self.staged()?;
        let entry = match staged.entry(txn) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                let arena = self.read()?.clone();
                manager.enlist(self.state.clone());
                slot.insert(Staged {
                    arena,
                    deltas: Vec::new(),
                })
            }
        };
        let (out, delta) = run_edit(&entry.arena, manager, self.id, build)?;
        entry.arena.absorb(delta.clone());
        entry.deltas.push(delta);
        Ok(out)
    }

    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Number of versions, root included.
    pub fn len(&self) -> VersionResult<usize> {
        Ok(self.read()?.versions.len())
    }

    pub fn is_empty(&self) -> VersionResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn root_version(&self) -> VersionResult<Version> {
        let arena = self.read()?;
        arena.get(&arena.root).cloned()
    }

    pub fn version(&self, id: &EntityId) -> VersionResult<Version> {
        self.read()?.get(id).cloned()
    }

    pub fn has_version(&self, id: &EntityId) -> VersionResult<bool> {
        Ok(self.read()?.versions.contains_key(id))
    }

    /// Resolves `id` as `manager` sees it: including the graph changes its
    /// open transaction staged, if any.
    pub fn version_in<M: ItemStateManager + ?Sized>(
        &self,
        manager: &M,
        id: &EntityId,
    ) -> VersionResult<Version> {
        if let Some(txn) = manager.transaction_id() {
            if let Some(staged) = self.staged()?.get(&txn) {
                return staged.arena.get(id).cloned();
            }
        }
        self.version(id)
    }

    /// Number of staged transactions not yet committed or rolled back.
    pub fn open_transactions(&self) -> VersionResult<usize> {
        Ok(self.staged()?.len())
    }

    pub fn version_by_name(&self, name: &str) -> VersionResult<Version> {
        let arena = self.read()?;
        let id = arena
            .names
            .get(name)
            .ok_or_else(|| VersionError::NotFound(name.to_string()))?;
        arena.get(id).cloned()
    }

    pub fn version_by_label(&self, label: &str) -> VersionResult<Version> {
        let arena = self.read()?;
        let id = arena
            .labels
            .get(label)
            .ok_or_else(|| VersionError::LabelNotFound(label.to_string()))?;
        arena.get(id).cloned()
    }

    /// Version names in lexical order.
    pub fn version_names(&self) -> VersionResult<Vec<String>> {
        Ok(self.read()?.names.keys().cloned().collect())
    }

    /// Every version in name order.
    pub fn versions(&self) -> VersionResult<Vec<Version>> {
        Ok(self.read()?.ordered().cloned().collect())
    }

    /// The frozen node recorded for a version.
    pub fn frozen_node_id(&self, id: &EntityId) -> VersionResult<EntityId> {
        Ok(self.read()?.get(id)?.frozen_node_id())
    }

    // ---------------------------------------------------------------
    // Navigation
    // ---------------------------------------------------------------

    /// Resolves the successor edges of a version.
    pub fn successors(&self, id: &EntityId) -> VersionResult<Vec<Version>> {
        let arena = self.read()?;
        arena.resolve(arena.get(id)?.successor_ids())
    }

    /// Resolves the predecessor edges of a version.
    pub fn predecessors(&self, id: &EntityId) -> VersionResult<Vec<Version>> {
        let arena = self.read()?;
        arena.resolve(arena.get(id)?.predecessor_ids())
    }

    /// The leftmost predecessor, or `None` for the root.
    pub fn linear_predecessor(&self, id: &EntityId) -> VersionResult<Option<Version>> {
        let arena = self.read()?;
        match arena.get(id)?.linear_predecessor_id() {
            Some(pred) => Ok(Some(arena.get(&pred)?.clone())),
            None => Ok(None),
        }
    }

    /// Walks `base`'s linear predecessor chain up to `id` and returns the
    /// chain element directly below it, or `None` if `id` is never reached.
    ///
    /// Fails with `CorruptChain` if the walk exceeds the version count.
    pub fn linear_successor(
        &self,
        id: &EntityId,
        base: &EntityId,
    ) -> VersionResult<Option<Version>> {
        let arena = self.read()?;
        arena.get(id)?;
        let bound = self
            .max_walk_factor
            .saturating_mul(arena.versions.len())
            .saturating_add(1);

        let mut current = arena.get(base)?;
        let mut steps = 0;
        while let Some(pred) = current.linear_predecessor_id() {
            if pred == *id {
                return Ok(Some(current.clone()));
            }
            steps += 1;
            if steps > bound {
                return Err(VersionError::CorruptChain { base: *base, steps });
            }
            current = arena.get(&pred)?;
        }
        Ok(None)
    }

    /// True if `other` is reachable from `id` through predecessor edges.
    ///
    /// Irreflexive on an acyclic graph. Each version is expanded once.
    pub fn is_more_recent(&self, id: &EntityId, other: &EntityId) -> VersionResult<bool> {
        let arena = self.read()?;
        arena.get(other)?;

        let mut queue: VecDeque<EntityId> =
            arena.get(id)?.predecessor_ids().iter().copied().collect();
        let mut visited = HashSet::new();
        while let Some(pred) = queue.pop_front() {
            if pred == *other {
                return Ok(true);
            }
            if visited.insert(pred) {
                queue.extend(arena.get(&pred)?.predecessor_ids().iter().copied());
            }
        }
        Ok(false)
    }

    // ---------------------------------------------------------------
    // Graph edits
    // ---------------------------------------------------------------

    /// Creates a successor of `predecessors` with its frozen node and
    /// attaches it to the graph.
    ///
    /// The name derives from the predecessor with the shortest name.
    pub fn checkin<M: UpdatableStateManager + ?Sized>(
        &self,
        manager: &mut M,
        predecessors: &[EntityId],
        frozen: BTreeMap<String, Vec<PropertyValue>>,
    ) -> VersionResult<Version> {
        let history = self.id;
        let version = self.apply_edit(manager, |arena, edit| {
            if predecessors.is_empty() {
                return Err(VersionError::structural(
                    history,
                    "a checked-in version needs a predecessor",
                ));
            }
            let mut preds: Vec<&Version> = Vec::with_capacity(predecessors.len());
            for pred in predecessors {
                let version = arena.get(pred)?;
                if !preds.contains(&version) {
                    preds.push(version);
                }
            }

            let base = naming_base(preds.iter().map(|v| v.name())).unwrap_or_default();
            let base_is_root = preds.iter().any(|v| v.is_root() && v.name() == base);
            let name = next_version_name(base, base_is_root, |n| arena.names.contains_key(n));

            let id = EntityId::new();
            let frozen_id = EntityId::new();
            let mut frozen_state = EntityState::new(frozen_id, names::FROZEN_NODE_KIND);
            for (prop, values) in frozen {
                frozen_state.set_property(prop, values);
            }
            let pred_ids: Vec<EntityId> = preds.iter().map(|v| v.id()).collect();

            let state = version_state(id, history, &name, &pred_ids, frozen_id);
            let version = Version::from_state(&state, history)?;

            let mut history_state = edit.get(&history)?;
            history_state.add_child(name, id);
            edit.store(history_state);
            edit.add(frozen_state);
            edit.add(state);
            attach_in(edit, &id)?;
            Ok(version)
        })?;

        log_event_with_fields(
            Event::VersionCreated,
            &[
                ("history_id", &history.to_string()),
                ("version_id", &version.id().to_string()),
                ("version_name", version.name()),
            ],
        );
        if let Some(metrics) = &self.metrics {
            metrics.increment_versions_created();
        }
        Ok(version)
    }

    /// Adds `id` to the successor list of each of its predecessors.
    pub fn internal_attach<M: UpdatableStateManager + ?Sized>(
        &self,
        manager: &mut M,
        id: &EntityId,
    ) -> VersionResult<()> {
        let added = self.apply_edit(manager, |arena, edit| {
            arena.get(id)?;
            attach_in(edit, id)
        })?;
        log_event_with_fields(
            Event::GraphAttach,
            &[("version_id", &id.to_string()), ("edges", &added.to_string())],
        );
        Ok(())
    }

    /// Removes `id` from its predecessors' successor lists and from its
    /// successors' predecessor lists.
    ///
    /// Neighbours are not reconnected to each other. `id`'s own edge lists
    /// are kept, so a following `internal_attach` restores the edges from
    /// its predecessors.
    pub fn internal_detach<M: UpdatableStateManager + ?Sized>(
        &self,
        manager: &mut M,
        id: &EntityId,
    ) -> VersionResult<()> {
        self.apply_edit(manager, |arena, edit| {
            arena.get(id)?;
            detach_in(edit, id)
        })?;
        log_event_with_fields(Event::GraphDetach, &[("version_id", &id.to_string())]);
        Ok(())
    }

    /// Removes predecessor `removed` from `id` and splices in `removed`'s
    /// own predecessors at its position.
    ///
    /// This alone can break edge symmetry; it is meant as one step of a
    /// larger edit such as `remove_version`.
    pub fn internal_detach_predecessor<M: UpdatableStateManager + ?Sized>(
        &self,
        manager: &mut M,
        id: &EntityId,
        removed: &EntityId,
    ) -> VersionResult<bool> {
        self.apply_edit(manager, |arena, edit| {
            arena.get(id)?;
            arena.get(removed)?;
            collapse_in(edit, id, removed, names::PREDECESSORS)
        })
    }

    /// Removes successor `removed` from `id` and splices in `removed`'s
    /// own successors at its position. Same caveat as
    /// `internal_detach_predecessor`.
    pub fn internal_detach_successor<M: UpdatableStateManager + ?Sized>(
        &self,
        manager: &mut M,
        id: &EntityId,
        removed: &EntityId,
    ) -> VersionResult<bool> {
        self.apply_edit(manager, |arena, edit| {
            arena.get(id)?;
            arena.get(removed)?;
            collapse_in(edit, id, removed, names::SUCCESSORS)
        })
    }

    /// Purges a version.
    ///
    /// Its successors inherit its predecessors and vice versa, its labels
    /// are dropped and its frozen node is deleted, all in one update.
    pub fn remove_version<M: UpdatableStateManager + ?Sized>(
        &self,
        manager: &mut M,
        id: &EntityId,
    ) -> VersionResult<()> {
        let history = self.id;
        let name = self.apply_edit(manager, |arena, edit| {
            let version = arena.get(id)?;
            if version.is_root() {
                return Err(VersionError::RootVersionRemoval);
            }

            for succ in version.successor_ids() {
                collapse_in(edit, succ, id, names::PREDECESSORS)?;
            }
            for pred in version.predecessor_ids() {
                collapse_in(edit, pred, id, names::SUCCESSORS)?;
            }

            let mut history_state = edit.get(&history)?;
            for (label, target) in &arena.labels {
                if target == id {
                    history_state.remove_property(&names::label_property(label));
                    edit.remove_reference(history, *id)?;
                }
            }
            history_state.remove_child(id);
            edit.store(history_state);

            let frozen = version.frozen_node_id();
            if edit.exists(&frozen) {
                let frozen_state = edit.get(&frozen)?;
                edit.delete(frozen_state);
            }
            let state = edit.get(id)?;
            edit.delete(state);
            Ok(version.name().to_string())
        })?;

        log_event_with_fields(
            Event::VersionRemoved,
            &[
                ("history_id", &history.to_string()),
                ("version_id", &id.to_string()),
                ("version_name", &name),
            ],
        );
        if let Some(metrics) = &self.metrics {
            metrics.increment_versions_removed();
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Labels
    // ---------------------------------------------------------------

    /// Assigns `label` to version `id`.
    ///
    /// A label held by another version is moved only if `move_label` is
    /// set. Returns the version that held the label before, if any.
    pub fn add_label<M: UpdatableStateManager + ?Sized>(
        &self,
        manager: &mut M,
        id: &EntityId,
        label: &str,
        move_label: bool,
    ) -> VersionResult<Option<EntityId>> {
        let history = self.id;
        let previous = self.apply_edit(manager, |arena, edit| {
            arena.get(id)?;
            let previous = arena.labels.get(label).copied();
            match previous {
                Some(current) if current == *id => return Ok(previous),
                Some(current) if !move_label => {
                    return Err(VersionError::LabelExists {
                        label: label.to_string(),
                        version: arena.get(&current)?.name().to_string(),
                    });
                }
                Some(current) => edit.remove_reference(history, current)?,
                None => {}
            }

            let mut history_state = edit.get(&history)?;
            history_state.set_property(
                names::label_property(label),
                vec![PropertyValue::Reference(*id)],
            );
            edit.store(history_state);
            edit.add_reference(history, *id)?;
            Ok(previous)
        })?;

        log_event_with_fields(
            Event::LabelAdded,
            &[("label", label), ("version_id", &id.to_string())],
        );
        Ok(previous)
    }

    /// Removes `label` from whichever version holds it and returns that
    /// version's id.
    pub fn remove_label<M: UpdatableStateManager + ?Sized>(
        &self,
        manager: &mut M,
        label: &str,
    ) -> VersionResult<EntityId> {
        let history = self.id;
        let target = self.apply_edit(manager, |arena, edit| {
            let target = *arena
                .labels
                .get(label)
                .ok_or_else(|| VersionError::LabelNotFound(label.to_string()))?;

            let mut history_state = edit.get(&history)?;
            history_state.remove_property(&names::label_property(label));
            edit.store(history_state);
            edit.remove_reference(history, target)?;
            Ok(target)
        })?;

        log_event_with_fields(
            Event::LabelRemoved,
            &[("label", label), ("version_id", &target.to_string())],
        );
        Ok(target)
    }

    pub fn has_label(&self, id: &EntityId, label: &str) -> VersionResult<bool> {
        Ok(self.read()?.get(id)?.has_label(label))
    }

    /// Labels of a version in name order.
    pub fn labels(&self, id: &EntityId) -> VersionResult<Vec<String>> {
        Ok(self.read()?.get(id)?.labels())
    }

    // ---------------------------------------------------------------
    // Legacy repair
    // ---------------------------------------------------------------

    /// Derives the successor edges missing on `id`'s predecessors.
    ///
    /// Nothing is written: the repairs come back as an unapplied change
    /// log for the caller to persist (or drop). Reload after persisting.
    pub fn legacy_resolve_successors<M: ItemStateManager + ?Sized>(
        &self,
        manager: &M,
        id: &EntityId,
    ) -> VersionResult<ChangeLog> {
        let arena = self.read()?;
        arena.get(id)?;
        let mut edit = GraphEdit::new(manager);
        attach_in(&mut edit, id)?;
        Ok(edit.finish())
    }

    /// Runs `legacy_resolve_successors` for every version as one batch.
    pub fn legacy_resolve_all<M: ItemStateManager + ?Sized>(
        &self,
        manager: &M,
    ) -> VersionResult<ChangeLog> {
        let arena = self.read()?;
        let mut edit = GraphEdit::new(manager);
        let mut repaired = 0;
        for version in arena.ordered() {
            repaired += attach_in(&mut edit, &version.id())?;
        }

        log_event_with_fields(
            Event::GraphRepair,
            &[("history_id", &self.id.to_string()), ("edges", &repaired.to_string())],
        );
        if let Some(metrics) = &self.metrics {
            metrics.add_graph_repairs(repaired as u64);
        }
        Ok(edit.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{MemoryStateStore, SharedStateStore};
    use crate::txn::TransactionalOverlay;

    fn setup() -> (TransactionalOverlay<MemoryStateStore>, VersionHistory) {
        let mut overlay = TransactionalOverlay::new(Arc::new(MemoryStateStore::new()));
        let history = VersionHistory::create(&mut overlay).unwrap();
        (overlay, history)
    }

    fn checkin(
        overlay: &mut TransactionalOverlay<MemoryStateStore>,
        history: &VersionHistory,
        preds: &[&Version],
    ) -> Version {
        let ids: Vec<EntityId> = preds.iter().map(|v| v.id()).collect();
        history.checkin(overlay, &ids, BTreeMap::new()).unwrap()
    }

    fn ids(versions: &[Version]) -> Vec<EntityId> {
        versions.iter().map(Version::id).collect()
    }

    #[test]
    fn test_create_has_root_only() {
        let (overlay, history) = setup();
        let root = history.root_version().unwrap();
        assert!(root.is_root());
        assert_eq!(root.name(), names::ROOT_VERSION_NAME);
        assert_eq!(history.len().unwrap(), 1);
        assert!(history.linear_predecessor(&root.id()).unwrap().is_none());
        assert!(overlay.store().has_item_state(&root.frozen_node_id()));
    }

    #[test]
    fn test_checkin_names_and_edges() {
        let (mut overlay, history) = setup();
        let root = history.root_version().unwrap();
        let v1 = checkin(&mut overlay, &history, &[&root]);
        let v2 = checkin(&mut overlay, &history, &[&v1]);
        let branch = checkin(&mut overlay, &history, &[&v1]);

        assert_eq!(v1.name(), "1.0");
        assert_eq!(v2.name(), "1.1");
        assert_eq!(branch.name(), "1.0.1");
        assert_eq!(ids(&history.successors(&v1.id()).unwrap()), vec![v2.id(), branch.id()]);
        assert_eq!(ids(&history.predecessors(&v2.id()).unwrap()), vec![v1.id()]);
    }

    #[test]
    fn test_checkin_without_predecessor_is_structural() {
        let (mut overlay, history) = setup();
        let err = history.checkin(&mut overlay, &[], BTreeMap::new()).unwrap_err();
        assert!(matches!(err, VersionError::Structural { .. }));
    }

    #[test]
    fn test_checkin_unknown_predecessor_not_found() {
        let (mut overlay, history) = setup();
        let err = history
            .checkin(&mut overlay, &[EntityId::new()], BTreeMap::new())
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(history.len().unwrap(), 1);
    }

    #[test]
    fn test_linear_successor_inverse() {
        let (mut overlay, history) = setup();
        let root = history.root_version().unwrap();
        let v1 = checkin(&mut overlay, &history, &[&root]);
        let v2 = checkin(&mut overlay, &history, &[&v1]);

        let pred = history.linear_predecessor(&v2.id()).unwrap().unwrap();
        assert_eq!(pred, v1);
        assert_eq!(history.linear_successor(&pred.id(), &v2.id()).unwrap(), Some(v2.clone()));
        assert_eq!(history.linear_successor(&root.id(), &v2.id()).unwrap(), Some(v1));
        assert_eq!(history.linear_successor(&v2.id(), &root.id()).unwrap(), None);
    }

    #[test]
    fn test_is_more_recent_through_merge() {
        let (mut overlay, history) = setup();
        let root = history.root_version().unwrap();
        let v1 = checkin(&mut overlay, &history, &[&root]);
        let a = checkin(&mut overlay, &history, &[&v1]);
        let b = checkin(&mut overlay, &history, &[&v1]);
        let merged = checkin(&mut overlay, &history, &[&a, &b]);

        assert!(history.is_more_recent(&merged.id(), &root.id()).unwrap());
        assert!(history.is_more_recent(&merged.id(), &b.id()).unwrap());
        assert!(!history.is_more_recent(&a.id(), &b.id()).unwrap());
        assert!(!history.is_more_recent(&merged.id(), &merged.id()).unwrap());
    }

    #[test]
    fn test_detach_then_attach_restores_neighbours() {
        let (mut overlay, history) = setup();
        let root = history.root_version().unwrap();
        let v1 = checkin(&mut overlay, &history, &[&root]);

        history.internal_detach(&mut overlay, &v1.id()).unwrap();
        assert!(history.successors(&root.id()).unwrap().is_empty());

        history.internal_attach(&mut overlay, &v1.id()).unwrap();
        history.internal_attach(&mut overlay, &v1.id()).unwrap();
        assert_eq!(ids(&history.successors(&root.id()).unwrap()), vec![v1.id()]);
    }

    #[test]
    fn test_collapse_splices_in_place() {
        let (mut overlay, history) = setup();
        let root = history.root_version().unwrap();
        let v1 = checkin(&mut overlay, &history, &[&root]);
        let a = checkin(&mut overlay, &history, &[&v1]);
        let b = checkin(&mut overlay, &history, &[&v1]);
        let c = checkin(&mut overlay, &history, &[&v1]);

        assert!(history
            .internal_detach_successor(&mut overlay, &v1.id(), &b.id())
            .unwrap());
        assert_eq!(ids(&history.successors(&v1.id()).unwrap()), vec![a.id(), c.id()]);
        assert!(!history
            .internal_detach_successor(&mut overlay, &v1.id(), &b.id())
            .unwrap());
    }

    #[test]
    fn test_remove_version_reconnects() {
        let (mut overlay, history) = setup();
        let root = history.root_version().unwrap();
        let v1 = checkin(&mut overlay, &history, &[&root]);
        let v2 = checkin(&mut overlay, &history, &[&v1]);
        history.add_label(&mut overlay, &v1.id(), "stable", false).unwrap();

        history.remove_version(&mut overlay, &v1.id()).unwrap();

        assert_eq!(ids(&history.successors(&root.id()).unwrap()), vec![v2.id()]);
        assert_eq!(ids(&history.predecessors(&v2.id()).unwrap()), vec![root.id()]);
        assert!(!history.has_version(&v1.id()).unwrap());
        assert!(!overlay.store().has_item_state(&v1.id()));
        assert!(!overlay.store().has_item_state(&v1.frozen_node_id()));
        assert!(matches!(
            history.version_by_label("stable"),
            Err(VersionError::LabelNotFound(_))
        ));
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let (mut overlay, history) = setup();
        let root = history.root_version().unwrap();
        let err = history.remove_version(&mut overlay, &root.id()).unwrap_err();
        assert!(matches!(err, VersionError::RootVersionRemoval));
    }

    #[test]
    fn test_labels_move_only_on_request() {
        let (mut overlay, history) = setup();
        let root = history.root_version().unwrap();
        let v1 = checkin(&mut overlay, &history, &[&root]);
        let v2 = checkin(&mut overlay, &history, &[&v1]);

        assert_eq!(history.add_label(&mut overlay, &v1.id(), "release", false).unwrap(), None);
        assert!(history.has_label(&v1.id(), "release").unwrap());

        let err = history.add_label(&mut overlay, &v2.id(), "release", false).unwrap_err();
        assert!(matches!(err, VersionError::LabelExists { .. }));

        let previous = history.add_label(&mut overlay, &v2.id(), "release", true).unwrap();
        assert_eq!(previous, Some(v1.id()));
        assert!(!history.has_label(&v1.id(), "release").unwrap());
        assert_eq!(history.labels(&v2.id()).unwrap(), vec!["release".to_string()]);
        assert_eq!(history.version_by_label("release").unwrap(), v2);

        let refs = overlay.get_node_references(&v2.id()).unwrap();
        assert_eq!(refs.referrers(), &[history.id()]);
        assert!(!overlay.has_node_references(&v1.id()));

        assert_eq!(history.remove_label(&mut overlay, "release").unwrap(), v2.id());
        assert!(history.labels(&v2.id()).unwrap().is_empty());
    }

    #[test]
    fn test_reload_restores_labels() {
        let (mut overlay, history) = setup();
        let root = history.root_version().unwrap();
        history.add_label(&mut overlay, &root.id(), "initial", false).unwrap();

        let loaded = VersionHistory::load(&overlay, history.id()).unwrap();
        assert!(loaded.has_label(&root.id(), "initial").unwrap());
        loaded.reload(&overlay).unwrap();
        assert_eq!(loaded.version_names().unwrap(), vec![names::ROOT_VERSION_NAME.to_string()]);
    }

    #[test]
    fn test_legacy_resolve_restores_missing_successors() {
        let (mut overlay, history) = setup();
        let root = history.root_version().unwrap();
        let v1 = checkin(&mut overlay, &history, &[&root]);

        // Simulate a legacy history without successor edges.
        let mut root_state = overlay.get_item_state(&root.id()).unwrap();
        root_state.set_property(names::SUCCESSORS, Vec::new());
        let mut legacy = ChangeLog::new();
        legacy.modified(root_state);
        overlay.update(legacy).unwrap();
        history.reload(&overlay).unwrap();
        assert!(history.successors(&root.id()).unwrap().is_empty());

        let repairs = history.legacy_resolve_successors(&overlay, &v1.id()).unwrap();
        assert_eq!(repairs.len(), 1);
        assert!(history.successors(&root.id()).unwrap().is_empty());

        overlay.update(repairs).unwrap();
        history.reload(&overlay).unwrap();
        assert_eq!(ids(&history.successors(&root.id()).unwrap()), vec![v1.id()]);
        assert!(history.legacy_resolve_all(&overlay).unwrap().is_empty());
    }

    #[test]
    fn test_huge_walk_factor_saturates() {
        let (mut overlay, history) = setup();
        let root = history.root_version().unwrap();
        let v1 = checkin(&mut overlay, &history, &[&root]);
        let v2 = checkin(&mut overlay, &history, &[&v1]);

        let history = VersionHistory::load(&overlay, history.id())
            .unwrap()
            .with_max_walk_factor(usize::MAX);
        assert_eq!(history.linear_successor(&root.id(), &v2.id()).unwrap(), Some(v1));
    }

    #[test]
    fn test_transactional_edits_stage_until_commit() {
        let (mut overlay, history) = setup();
        let root = history.root_version().unwrap();

        let mut txn = overlay.begin().unwrap();
        let v1 = checkin(txn.overlay_mut(), &history, &[&root]);
        history.add_label(txn.overlay_mut(), &v1.id(), "draft", false).unwrap();
        assert_eq!(txn.overlay().context().enlisted(), 1);
        assert!(history.version_in(txn.overlay(), &v1.id()).unwrap().has_label("draft"));
        assert!(matches!(
            history.version_by_label("draft"),
            Err(VersionError::LabelNotFound(_))
        ));
        txn.commit().unwrap();

        assert_eq!(history.version_by_label("draft").unwrap().id(), v1.id());
        assert_eq!(ids(&history.successors(&root.id()).unwrap()), vec![v1.id()]);
        assert_eq!(history.open_transactions().unwrap(), 0);
    }
}
