//! Version graph error types
//!
//! Error codes:
//! - VV_VERSION_STRUCTURAL (graph invariant broken, surfaced not repaired)
//! - VV_VERSION_NOT_FOUND (edge, name or label unresolvable)
//! - VV_VERSION_CORRUPT_CHAIN (linear walk exceeded the version count)
//! - VV_VERSION_LABEL_EXISTS / VV_VERSION_LABEL_NOT_FOUND
//! - VV_VERSION_ROOT_REMOVAL
//! - VV_VERSION_LOCK_POISONED
//!
//! State and transaction errors keep their own codes.

use thiserror::Error;

use crate::state::{EntityId, StateError};
use crate::txn::TransactionError;

/// Errors raised by version histories.
#[derive(Debug, Error)]
pub enum VersionError {
    /// A persisted version or history violates a graph invariant.
    #[error("version graph structure violated at {id}: {reason}")]
    Structural { id: EntityId, reason: String },

    /// An id, name or label does not resolve to a version of this history.
    #[error("version not found: {0}")]
    NotFound(String),

    /// The linear predecessor chain does not terminate.
    #[error("linear chain from {base} did not terminate after {steps} steps")]
    CorruptChain { base: EntityId, steps: usize },

    /// The label is already assigned and moving was not requested.
    #[error("label '{label}' already assigned to version {version}")]
    LabelExists { label: String, version: String },

    #[error("label not found: {0}")]
    LabelNotFound(String),

    #[error("the root version cannot be removed")]
    RootVersionRemoval,

    /// Another thread panicked while holding the history lock.
    #[error("version history lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl VersionError {
    pub(crate) fn structural(id: EntityId, reason: impl Into<String>) -> Self {
        VersionError::Structural {
            id,
            reason: reason.into(),
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            VersionError::Structural { .. } => "VV_VERSION_STRUCTURAL",
            VersionError::NotFound(_) => "VV_VERSION_NOT_FOUND",
            VersionError::CorruptChain { .. } => "VV_VERSION_CORRUPT_CHAIN",
            VersionError::LabelExists { .. } => "VV_VERSION_LABEL_EXISTS",
            VersionError::LabelNotFound(_) => "VV_VERSION_LABEL_NOT_FOUND",
            VersionError::RootVersionRemoval => "VV_VERSION_ROOT_REMOVAL",
            VersionError::LockPoisoned => "VV_VERSION_LOCK_POISONED",
            VersionError::State(err) => err.code(),
            VersionError::Transaction(err) => err.code(),
        }
    }

    /// Returns true when an entity id failed to resolve, at either layer.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            VersionError::NotFound(_) | VersionError::State(StateError::NotFound(_))
        )
    }
}

/// Result type for version graph operations
pub type VersionResult<T> = Result<T, VersionError>;
