//! Item state error types
//!
//! Error codes:
//! - VV_STATE_NOT_FOUND (ERROR severity)
//! - VV_STATE_REFERENCES_NOT_FOUND (ERROR severity)
//! - VV_STATE_INTEGRITY_VIOLATION (ERROR severity, recoverable by undo)
//! - VV_STATE_CONSISTENCY_VIOLATION (ERROR severity, recoverable by undo)
//! - VV_STATE_IO_ERROR (ERROR severity)
//! - VV_STATE_CORRUPTION (FATAL severity, snapshot files only)
//! - VV_STATE_SERIALIZATION (ERROR severity)

use std::fmt;
use std::io;

use thiserror::Error;

use super::EntityId;

/// Severity levels for state errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, caller may retry with a fresh transaction
    Error,
    /// The persisted snapshot cannot be trusted
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Errors raised by change logs and shared state stores.
#[derive(Debug, Error)]
pub enum StateError {
    /// No state exists for the entity, or it is deleted in a pending log.
    #[error("item state not found: {0}")]
    NotFound(EntityId),

    /// No references record exists for the entity.
    #[error("node references not found: {0}")]
    ReferencesNotFound(EntityId),

    /// Applying the log would leave a dangling required reference.
    #[error("referential integrity violated for {target}: {reason}")]
    IntegrityViolation {
        /// The referenced entity
        target: EntityId,
        /// What is wrong with it
        reason: String,
    },

    /// The log does not match the store (stale or duplicate state).
    #[error("state consistency violated for {id}: {reason}")]
    ConsistencyViolation {
        /// The offending entity
        id: EntityId,
        /// What is wrong with it
        reason: String,
    },

    /// Snapshot file could not be read or written.
    #[error("snapshot I/O failed: {message}")]
    Io {
        /// Context of the failure
        message: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Snapshot checksum or envelope mismatch.
    #[error("snapshot corrupted: {0}")]
    Corruption(String),

    /// Snapshot body could not be encoded or decoded.
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StateError {
    /// Create an integrity violation
    pub fn integrity(target: EntityId, reason: impl Into<String>) -> Self {
        Self::IntegrityViolation {
            target,
            reason: reason.into(),
        }
    }

    /// Create a consistency violation
    pub fn consistency(id: EntityId, reason: impl Into<String>) -> Self {
        Self::ConsistencyViolation {
            id,
            reason: reason.into(),
        }
    }

    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            StateError::NotFound(_) => "VV_STATE_NOT_FOUND",
            StateError::ReferencesNotFound(_) => "VV_STATE_REFERENCES_NOT_FOUND",
            StateError::IntegrityViolation { .. } => "VV_STATE_INTEGRITY_VIOLATION",
            StateError::ConsistencyViolation { .. } => "VV_STATE_CONSISTENCY_VIOLATION",
            StateError::Io { .. } => "VV_STATE_IO_ERROR",
            StateError::Corruption(_) => "VV_STATE_CORRUPTION",
            StateError::Serialization(_) => "VV_STATE_SERIALIZATION",
        }
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        match self {
            StateError::Corruption(_) => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Integrity and consistency violations are undone and may be retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StateError::IntegrityViolation { .. } | StateError::ConsistencyViolation { .. }
        )
    }

    /// Returns whether this error is fatal
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

/// Result type for state operations
pub type StateResult<T> = Result<T, StateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let id = EntityId::new();
        assert_eq!(StateError::NotFound(id).code(), "VV_STATE_NOT_FOUND");
        assert_eq!(
            StateError::integrity(id, "still referenced").code(),
            "VV_STATE_INTEGRITY_VIOLATION"
        );
        assert_eq!(
            StateError::consistency(id, "stale").code(),
            "VV_STATE_CONSISTENCY_VIOLATION"
        );
        assert_eq!(
            StateError::Corruption("bad crc".into()).code(),
            "VV_STATE_CORRUPTION"
        );
    }

    #[test]
    fn test_violations_are_recoverable() {
        let id = EntityId::new();
        assert!(StateError::integrity(id, "x").is_recoverable());
        assert!(StateError::consistency(id, "x").is_recoverable());
        assert!(!StateError::NotFound(id).is_recoverable());
    }

    #[test]
    fn test_only_corruption_is_fatal() {
        let id = EntityId::new();
        assert!(StateError::Corruption("x".into()).is_fatal());
        assert!(!StateError::integrity(id, "x").is_fatal());
        assert!(!StateError::io("open", io::Error::new(io::ErrorKind::Other, "x")).is_fatal());
    }

    #[test]
    fn test_display_contains_context() {
        let id = EntityId::new();
        let display = format!("{}", StateError::integrity(id, "2 referrers remain"));
        assert!(display.contains(&id.to_string()));
        assert!(display.contains("2 referrers remain"));
    }
}
