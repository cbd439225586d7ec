//! CommitContext - explicit scope bindings for pending change logs
//!
//! Two scopes can each hold at most one log:
//! - commit scope: bound only while prepare/commit/rollback run
//! - transaction scope: bound for a user transaction's whole lifetime
//!
//! When both are bound the commit scope shadows reads; the transaction
//! scope is not consulted at all.
//!
//! The context also tracks the transaction those logs belong to: its id
//! and the resources enlisted to hear its outcome.

use std::sync::Arc;

use uuid::Uuid;

use crate::state::ChangeLog;

use super::resource::TransactionResource;

/// Binding scope of a change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Narrow scope used by the committing path
    Commit,
    /// Wide scope spanning a user transaction
    Transaction,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Commit => "commit",
            Scope::Transaction => "transaction",
        }
    }
}

/// Per-context bindings of pending logs.
///
/// A context belongs to exactly one execution context; it is owned by
/// an overlay and never shared between threads.
#[derive(Debug, Default)]
pub struct CommitContext {
    commit: Option<ChangeLog>,
    transaction: Option<ChangeLog>,
    txn_id: Option<Uuid>,
    resources: Vec<Arc<dyn TransactionResource>>,
}

impl CommitContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, scope: Scope) -> &mut Option<ChangeLog> {
        match scope {
            Scope::Commit => &mut self.commit,
            Scope::Transaction => &mut self.transaction,
        }
    }

    /// Installs `log` in `scope` (or clears it with `None`), returning the
    /// previously bound log.
    pub fn bind(&mut self, scope: Scope, log: Option<ChangeLog>) -> Option<ChangeLog> {
        std::mem::replace(self.slot(scope), log)
    }

    /// Removes and returns the log bound in `scope`.
    pub fn take(&mut self, scope: Scope) -> Option<ChangeLog> {
        self.slot(scope).take()
    }

    pub fn get(&self, scope: Scope) -> Option<&ChangeLog> {
        match scope {
            Scope::Commit => self.commit.as_ref(),
            Scope::Transaction => self.transaction.as_ref(),
        }
    }

    pub fn get_mut(&mut self, scope: Scope) -> Option<&mut ChangeLog> {
        self.slot(scope).as_mut()
    }

    pub fn is_bound(&self, scope: Scope) -> bool {
        self.get(scope).is_some()
    }

    /// The log that shadows reads: the commit scope if bound, otherwise
    /// the transaction scope.
    pub fn shadowing(&self) -> Option<&ChangeLog> {
        self.commit.as_ref().or(self.transaction.as_ref())
    }

    /// Id of the transaction in progress, if any.
    pub fn transaction_id(&self) -> Option<Uuid> {
        self.txn_id
    }

    /// Returns the current transaction id, assigning one if none is set.
    pub(crate) fn start_transaction(&mut self) -> Uuid {
        *self.txn_id.get_or_insert_with(Uuid::new_v4)
    }

    /// Registers a resource once; later registrations of the same
    /// resource are ignored.
    pub(crate) fn enlist(&mut self, resource: Arc<dyn TransactionResource>) {
        if !self.resources.iter().any(|r| Arc::ptr_eq(r, &resource)) {
            self.resources.push(resource);
        }
    }

    pub fn enlisted(&self) -> usize {
        self.resources.len()
    }

    /// Ends the current transaction, handing back its id and resources.
    pub(crate) fn end_transaction(&mut self) -> (Option<Uuid>, Vec<Arc<dyn TransactionResource>>) {
        (self.txn_id.take(), std::mem::take(&mut self.resources))
    }
}
