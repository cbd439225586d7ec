//! TransactionalOverlay - buffered item state over a shared store
//!
//! Remembers changes across multiple `update` calls and applies them only
//! when the associated transaction commits.
//!
//! # Read precedence
//!
//! 1. commit-scope log, if bound (the transaction-scope log is then ignored)
//! 2. otherwise the transaction-scope log, if bound
//! 3. the shared store
//!
//! # Failure semantics
//!
//! Prepare and commit undo the commit-scope log before reporting any
//! error. Rollback never fails.
//!
//! # Enlisted resources
//!
//! Resources enlisted while a transaction-scope log is bound are told the
//! outcome once it is known: `commit` after a successful apply, `rollback`
//! after any undo or when the bound log is dropped unapplied.

use std::sync::Arc;

use uuid::Uuid;

use crate::observability::{log_event_with_fields, Event, Logger, MetricsRegistry};
use crate::state::{
    ChangeLog, EntityId, EntityState, NodeReferences, Pending, SharedStateStore, StateError,
    StateResult,
};

use super::context::{CommitContext, Scope};
use super::errors::{TransactionError, TxnResult};
use super::manager::{ItemStateManager, UpdatableStateManager};
use super::resource::TransactionResource;

/// Per-transaction overlay of pending changes on a shared store.
pub struct TransactionalOverlay<S: SharedStateStore + ?Sized> {
    store: Arc<S>,
    context: CommitContext,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl<S: SharedStateStore + ?Sized> TransactionalOverlay<S> {
    /// Creates an overlay with no bound logs.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            context: CommitContext::new(),
            metrics: None,
        }
    }

    /// Reports commit and rollback counters into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn context(&self) -> &CommitContext {
        &self.context
    }

    pub(crate) fn metrics(&self) -> Option<&MetricsRegistry> {
        self.metrics.as_deref()
    }

    /// Installs a change log in the given scope; `None` clears the scope.
    ///
    /// Returns the log previously bound there. Binding a transaction-scope
    /// log starts a transaction; clearing it while no commit-scope log is
    /// bound abandons that transaction.
    pub fn set_change_log(&mut self, log: Option<ChangeLog>, scope: Scope) -> Option<ChangeLog> {
        let binds_transaction = log.is_some();
        let previous = self.context.bind(scope, log);
        if scope == Scope::Transaction {
            if binds_transaction {
                self.context.start_transaction();
            } else if !self.context.is_bound(Scope::Commit) {
                self.settle(false);
            }
        }
        previous
    }

    /// Binds a fresh transaction-scope log and returns the id of the
    /// transaction it starts.
    pub(crate) fn bind_transaction(&mut self) -> Uuid {
        self.set_change_log(Some(ChangeLog::new()), Scope::Transaction);
        self.context.start_transaction()
    }

    /// Moves the transaction-scope log into the commit scope.
    pub(crate) fn promote_change_log(&mut self) {
        let log = self.context.take(Scope::Transaction).unwrap_or_default();
        self.context.bind(Scope::Commit, Some(log));
    }

    /// Id of the transaction buffering updates, if a transaction-scope log
    /// is bound.
    pub fn transaction_id(&self) -> Option<Uuid> {
        if self.context.is_bound(Scope::Transaction) {
            self.context.transaction_id()
        } else {
            None
        }
    }

    /// Enlists `resource` in the transaction buffering updates. Without a
    /// bound transaction-scope log this does nothing.
    pub fn enlist(&mut self, resource: Arc<dyn TransactionResource>) {
        if self.context.is_bound(Scope::Transaction) {
            self.context.enlist(resource);
        }
    }

    /// Ends the current transaction and reports its outcome to every
    /// enlisted resource.
    fn settle(&mut self, committed: bool) {
        let (txn, resources) = self.context.end_transaction();
        if self.context.is_bound(Scope::Transaction) {
            self.context.start_transaction();
        }
        let Some(txn) = txn else {
            return;
        };
        for resource in resources {
            if committed {
                resource.commit(txn);
            } else {
                resource.rollback(txn);
            }
        }
    }

    fn count_rollback(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.increment_transactions_rolled_back();
        }
    }

    /// Returns the log bound in `scope`.
    pub fn change_log(&self, scope: Scope) -> Option<&ChangeLog> {
        self.context.get(scope)
    }

    /// Validates referential integrity of the commit-scope log.
    ///
    /// A no-op when no commit-scope log is bound. On failure the log is
    /// undone and the transaction must not proceed to commit.
    pub fn prepare(&mut self) -> TxnResult<()> {
        let Some(log) = self.context.get_mut(Scope::Commit) else {
            return Ok(());
        };

        if let Err(source) = self.store.check_referential_integrity(log) {
            Logger::error(
                Event::TxnPrepareFailed.as_str(),
                &[("code", source.code()), ("reason", &source.to_string())],
            );
            log.undo(&*self.store);
            if let Some(metrics) = &self.metrics {
                metrics.increment_prepare_failures();
            }
            self.count_rollback();
            self.settle(false);
            return Err(TransactionError::Prepare { source });
        }

        let entries = log.len().to_string();
        log_event_with_fields(Event::TxnPrepared, &[("entries", &entries)]);
        if let Some(metrics) = &self.metrics {
            metrics.increment_transactions_prepared();
        }
        Ok(())
    }

    /// Applies the commit-scope log to the shared store atomically.
    ///
    /// On success the log is reset but stays bound; the caller clears the
    /// scope. On failure the log is undone.
    pub fn commit(&mut self) -> TxnResult<()> {
        let Some(log) = self.context.get_mut(Scope::Commit) else {
            return Ok(());
        };

        if let Err(source) = self.store.atomic_apply(log) {
            Logger::error(
                Event::TxnCommitFailed.as_str(),
                &[("code", source.code()), ("reason", &source.to_string())],
            );
            log.undo(&*self.store);
            if let Some(metrics) = &self.metrics {
                metrics.increment_commit_failures();
            }
            self.count_rollback();
            self.settle(false);
            return Err(TransactionError::Commit { source });
        }

        let applied = log.len();
        log.reset();
        log_event_with_fields(Event::TxnCommitted, &[("entries", &applied.to_string())]);
        if let Some(metrics) = &self.metrics {
            metrics.increment_transactions_committed();
            metrics.add_entities_applied(applied as u64);
        }
        self.settle(true);
        Ok(())
    }

    /// Undoes the commit-scope log. Safe to call at any time.
    pub fn rollback(&mut self) {
        if let Some(log) = self.context.get_mut(Scope::Commit) {
            log.undo(&*self.store);
            log_event_with_fields(Event::TxnRolledBack, &[]);
            self.count_rollback();
        }
        self.settle(false);
    }

    /// The log that shadows reads, if any.
    fn shadow(&self, id: &EntityId) -> Pending<'_> {
        match self.context.shadowing() {
            Some(log) => log.lookup(id),
            None => Pending::Absent,
        }
    }

    fn shadow_references(&self, id: &EntityId) -> Option<&NodeReferences> {
        self.context
            .shadowing()
            .and_then(|log| log.get_references(id))
    }

    /// Merges into the transaction-scope log when bound, otherwise applies
    /// the log to the store immediately.
    pub fn update(&mut self, mut log: ChangeLog) -> TxnResult<()> {
        if let Some(tx_log) = self.context.get_mut(Scope::Transaction) {
            let merged = log.len().to_string();
            tx_log.merge(log);
            Logger::trace(Event::UpdateMerged.as_str(), &[("entries", &merged)]);
            return Ok(());
        }

        match self.store.atomic_apply(&log) {
            Ok(()) => {
                let applied = log.len();
                Logger::trace(
                    Event::UpdateApplied.as_str(),
                    &[("entries", &applied.to_string())],
                );
                if let Some(metrics) = &self.metrics {
                    metrics.add_entities_applied(applied as u64);
                }
                Ok(())
            }
            Err(source) => {
                Logger::error(
                    Event::UpdateFailed.as_str(),
                    &[("code", source.code()), ("reason", &source.to_string())],
                );
                log.undo(&*self.store);
                Err(TransactionError::Update { source })
            }
        }
    }

    pub fn get_item_state(&self, id: &EntityId) -> StateResult<EntityState> {
        match self.shadow(id) {
            Pending::Present(state) => Ok(state.clone()),
            Pending::Deleted => Err(StateError::NotFound(*id)),
            Pending::Absent => self.store.read(id),
        }
    }

    pub fn has_item_state(&self, id: &EntityId) -> bool {
        match self.shadow(id) {
            Pending::Present(_) => true,
            Pending::Deleted => false,
            Pending::Absent => self.store.has_item_state(id),
        }
    }

    pub fn get_node_references(&self, id: &EntityId) -> StateResult<NodeReferences> {
        match self.shadow_references(id) {
            Some(refs) => Ok(refs.clone()),
            None => self.store.read_references(id),
        }
    }

    pub fn has_node_references(&self, id: &EntityId) -> bool {
        self.shadow_references(id).is_some() || self.store.has_references(id)
    }
}

impl<S: SharedStateStore + ?Sized> ItemStateManager for TransactionalOverlay<S> {
    fn get_item_state(&self, id: &EntityId) -> StateResult<EntityState> {
        TransactionalOverlay::get_item_state(self, id)
    }

    fn has_item_state(&self, id: &EntityId) -> bool {
        TransactionalOverlay::has_item_state(self, id)
    }

    fn get_node_references(&self, id: &EntityId) -> StateResult<NodeReferences> {
        TransactionalOverlay::get_node_references(self, id)
    }

    fn has_node_references(&self, id: &EntityId) -> bool {
        TransactionalOverlay::has_node_references(self, id)
    }

    fn transaction_id(&self) -> Option<Uuid> {
        TransactionalOverlay::transaction_id(self)
    }
}

impl<S: SharedStateStore + ?Sized> UpdatableStateManager for TransactionalOverlay<S> {
    fn update(&mut self, log: ChangeLog) -> TxnResult<()> {
        TransactionalOverlay::update(self, log)
    }

    fn enlist(&mut self, resource: Arc<dyn TransactionResource>) {
        TransactionalOverlay::enlist(self, resource)
    }
}
