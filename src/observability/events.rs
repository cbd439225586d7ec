//! Observable events
//!
//! Events are explicit and typed; their string form is the `event` key of
//! every log line.

use std::fmt;

/// Observable events in versionvault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration loaded
    ConfigLoaded,

    // Change logs
    /// A change log was undone
    ChangeLogUndo,
    /// An undone entry no longer exists in the store
    ChangeLogUndoVanished,

    // Transactions
    /// Transaction-scope log bound
    TxnBegin,
    /// Integrity check passed
    TxnPrepared,
    /// Integrity check failed, log undone
    TxnPrepareFailed,
    /// Commit-scope log applied
    TxnCommitted,
    /// Atomic apply failed, log undone
    TxnCommitFailed,
    /// Commit-scope log undone on request
    TxnRolledBack,
    /// Update merged into the transaction-scope log
    UpdateMerged,
    /// Update applied directly to the store
    UpdateApplied,
    /// Direct update failed, log undone
    UpdateFailed,

    // Version graph
    /// Version history created
    HistoryCreated,
    /// Version history arena rebuilt from persisted state
    HistoryReloaded,
    /// Staged graph changes of a committed transaction published
    HistoryStagePublished,
    /// Staged graph changes of a rolled back transaction dropped
    HistoryStageDiscarded,
    /// Version checked in
    VersionCreated,
    /// Version purged
    VersionRemoved,
    /// Version attached to its predecessors
    GraphAttach,
    /// Version detached from its neighbours
    GraphDetach,
    /// Label set on a version
    LabelAdded,
    /// Label removed from a version
    LabelRemoved,
    /// Missing successor edges derived
    GraphRepair,
    /// Graph verification found problems
    GraphInconsistent,

    // Snapshots
    /// Snapshot written
    SnapshotSaved,
    /// Snapshot opened
    SnapshotOpened,
    /// Snapshot failed verification (FATAL)
    SnapshotCorruption,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::ChangeLogUndo => "CHANGELOG_UNDO",
            Event::ChangeLogUndoVanished => "CHANGELOG_UNDO_VANISHED",

            Event::TxnBegin => "TXN_BEGIN",
            Event::TxnPrepared => "TXN_PREPARED",
            Event::TxnPrepareFailed => "TXN_PREPARE_FAILED",
            Event::TxnCommitted => "TXN_COMMITTED",
            Event::TxnCommitFailed => "TXN_COMMIT_FAILED",
            Event::TxnRolledBack => "TXN_ROLLED_BACK",
            Event::UpdateMerged => "UPDATE_MERGED",
            Event::UpdateApplied => "UPDATE_APPLIED",
            Event::UpdateFailed => "UPDATE_FAILED",

            Event::HistoryCreated => "HISTORY_CREATED",
            Event::HistoryReloaded => "HISTORY_RELOADED",
            Event::HistoryStagePublished => "HISTORY_STAGE_PUBLISHED",
            Event::HistoryStageDiscarded => "HISTORY_STAGE_DISCARDED",
            Event::VersionCreated => "VERSION_CREATED",
            Event::VersionRemoved => "VERSION_REMOVED",
            Event::GraphAttach => "GRAPH_ATTACH",
            Event::GraphDetach => "GRAPH_DETACH",
            Event::LabelAdded => "LABEL_ADDED",
            Event::LabelRemoved => "LABEL_REMOVED",
            Event::GraphRepair => "GRAPH_REPAIR",
            Event::GraphInconsistent => "GRAPH_INCONSISTENT",

            Event::SnapshotSaved => "SNAPSHOT_SAVED",
            Event::SnapshotOpened => "SNAPSHOT_OPENED",
            Event::SnapshotCorruption => "SNAPSHOT_CORRUPTION",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::SnapshotCorruption)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
