//! Transaction - two-phase driver over a TransactionalOverlay
//!
//! Lifecycle: Active -> Prepared -> Committed, with RolledBack reachable
//! from Active or Prepared (explicitly, on failure, or on drop).
//!
//! Scope bindings:
//! - begin binds a fresh transaction-scope log
//! - prepare moves that log into the commit scope
//! - every terminal path clears both scopes
//!
//! Every path into RolledBack counts one rollback, whichever phase failed.

use uuid::Uuid;

use crate::observability::{log_event_with_fields, Event, ObservationScope};
use crate::state::SharedStateStore;

use super::context::Scope;
use super::errors::{TransactionError, TxnResult};
use super::overlay::TransactionalOverlay;

/// Transaction lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Prepared,
    Committed,
    RolledBack,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Active => "active",
            TransactionStatus::Prepared => "prepared",
            TransactionStatus::Committed => "committed",
            TransactionStatus::RolledBack => "rolled back",
        }
    }
}

impl<S: SharedStateStore + ?Sized> TransactionalOverlay<S> {
    /// Starts a user transaction.
    ///
    /// Fails if a transaction-scope log is already bound.
    pub fn begin(&mut self) -> TxnResult<Transaction<'_, S>> {
        if self.context().is_bound(Scope::Transaction) {
            return Err(TransactionError::InvalidState {
                operation: "begin",
                status: "a transaction is already bound",
            });
        }
        let id = self.bind_transaction();
        log_event_with_fields(Event::TxnBegin, &[("txn_id", &id.to_string())]);
        if let Some(metrics) = self.metrics() {
            metrics.increment_transactions_begun();
        }

        Ok(Transaction {
            overlay: self,
            id,
            status: TransactionStatus::Active,
        })
    }
}

/// An in-flight user transaction.
///
/// Reads and updates go through `overlay()` / `overlay_mut()` and observe
/// the transaction's own pending changes. Dropping an unfinished
/// transaction rolls it back.
pub struct Transaction<'o, S: SharedStateStore + ?Sized> {
    overlay: &'o mut TransactionalOverlay<S>,
    id: Uuid,
    status: TransactionStatus,
}

impl<'o, S: SharedStateStore + ?Sized> Transaction<'o, S> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn overlay(&self) -> &TransactionalOverlay<S> {
        self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut TransactionalOverlay<S> {
        self.overlay
    }

    /// Moves the pending log into the commit scope and validates it.
    ///
    /// On failure the log has already been undone and the transaction is
    /// rolled back.
    pub fn prepare(&mut self) -> TxnResult<()> {
        if self.status != TransactionStatus::Active {
            return Err(self.invalid("prepare"));
        }

        self.overlay.promote_change_log();

        match self.overlay.prepare() {
            Ok(()) => {
                self.status = TransactionStatus::Prepared;
                Ok(())
            }
            Err(err) => {
                self.finish(TransactionStatus::RolledBack);
                Err(err)
            }
        }
    }

    /// Applies the transaction. Prepares first if still active.
    pub fn commit(mut self) -> TxnResult<()> {
        if self.status == TransactionStatus::Active {
            self.prepare()?;
        }
        if self.status != TransactionStatus::Prepared {
            return Err(self.invalid("commit"));
        }

        let id = self.id.to_string();
        let scope = ObservationScope::with_fields("TXN_COMMIT", &[("txn_id", &id)]);
        match self.overlay.commit() {
            Ok(()) => {
                scope.complete();
                self.finish(TransactionStatus::Committed);
                Ok(())
            }
            Err(err) => {
                scope.fail(err.code());
                self.finish(TransactionStatus::RolledBack);
                Err(err)
            }
        }
    }

    /// Discards every pending change. Never fails.
    pub fn rollback(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        match self.status {
            TransactionStatus::Active => {
                self.overlay.promote_change_log();
                self.overlay.rollback();
            }
            TransactionStatus::Prepared => self.overlay.rollback(),
            TransactionStatus::Committed | TransactionStatus::RolledBack => return,
        }
        self.finish(TransactionStatus::RolledBack);
    }

    fn finish(&mut self, status: TransactionStatus) {
        self.overlay.set_change_log(None, Scope::Commit);
        self.overlay.set_change_log(None, Scope::Transaction);
        self.status = status;
    }

    fn invalid(&self, operation: &'static str) -> TransactionError {
        TransactionError::InvalidState {
            operation,
            status: self.status.as_str(),
        }
    }
}

impl<S: SharedStateStore + ?Sized> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        self.abort();
    }
}
