//! Item state subsystem
//!
//! Holds committed entity states and the change logs that buffer pending
//! mutations against them.
//!
//! # Design Principles
//!
//! - The shared store is the single source of truth
//! - Pending mutations live only in a `ChangeLog` until applied
//! - Application is atomic: all entries or none
//! - Integrity and consistency violations are recoverable
//!
//! This module provides:
//! - `EntityId`, `EntityState`, `NodeReferences` - the stored records
//! - `ChangeLog` - mergeable, undoable pending mutations
//! - `SharedStateStore` - the backing store contract
//! - `MemoryStateStore` - a lock-guarded in-memory store with snapshots

mod change_log;
mod checksum;
mod entity;
mod errors;
mod id;
mod snapshot;
mod store;

pub use change_log::{ChangeKind, ChangeLog, Pending};
pub use checksum::{compute_checksum, verify_checksum};
pub use entity::{ChildEntry, EntityState, NodeReferences, PropertyValue};
pub use errors::{Severity, StateError, StateResult};
pub use id::EntityId;
pub use store::{MemoryStateStore, SharedStateStore};
