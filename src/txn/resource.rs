//! Transaction resources
//!
//! Components that keep derived state for uncommitted changes enlist with
//! the overlay that buffers those changes. Once the transaction's outcome
//! is decided every enlisted resource hears it exactly once.

use std::fmt;

use uuid::Uuid;

/// Participant in a transaction's outcome.
pub trait TransactionResource: fmt::Debug + Send + Sync {
    /// The transaction's changes reached the shared store.
    fn commit(&self, txn: Uuid);

    /// The transaction's changes were undone or never applied.
    fn rollback(&self, txn: Uuid);
}
