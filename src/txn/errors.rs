//! Transaction error types
//!
//! Every variant that wraps a `StateError` is raised only after the pending
//! log has been undone; callers never observe a half-applied transaction.

use thiserror::Error;

use crate::state::StateError;

/// Errors from the overlay's prepare/commit/update path.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Integrity validation failed during prepare
    #[error("Unable to prepare transaction: {source}")]
    Prepare {
        #[source]
        source: StateError,
    },

    /// Atomic apply failed during commit
    #[error("Unable to commit transaction: {source}")]
    Commit {
        #[source]
        source: StateError,
    },

    /// A direct (non-transactional) update failed
    #[error("Unable to apply update: {source}")]
    Update {
        #[source]
        source: StateError,
    },

    /// Operation not allowed in the transaction's current state
    #[error("Invalid transaction state: cannot {operation} while {status}")]
    InvalidState {
        operation: &'static str,
        status: &'static str,
    },
}

impl TransactionError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            TransactionError::Prepare { .. } => "VV_TXN_PREPARE_FAILED",
            TransactionError::Commit { .. } => "VV_TXN_COMMIT_FAILED",
            TransactionError::Update { .. } => "VV_TXN_UPDATE_FAILED",
            TransactionError::InvalidState { .. } => "VV_TXN_INVALID_STATE",
        }
    }

    /// Returns the underlying state error, if any.
    pub fn state_error(&self) -> Option<&StateError> {
        match self {
            TransactionError::Prepare { source }
            | TransactionError::Commit { source }
            | TransactionError::Update { source } => Some(source),
            TransactionError::InvalidState { .. } => None,
        }
    }

    pub fn is_integrity_violation(&self) -> bool {
        matches!(self.state_error(), Some(StateError::IntegrityViolation { .. }))
    }

    pub fn is_consistency_violation(&self) -> bool {
        matches!(self.state_error(), Some(StateError::ConsistencyViolation { .. }))
    }
}

/// Result type for transaction operations
pub type TxnResult<T> = Result<T, TransactionError>;
