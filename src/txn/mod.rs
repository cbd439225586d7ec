//! Transactional overlay subsystem
//!
//! Buffers uncommitted mutations per logical transaction and commits them
//! atomically against a shared state store.
//!
//! # Design Principles
//!
//! - Scope bindings are explicit values owned by the overlay
//! - The commit scope always shadows the transaction scope for reads
//! - Prepare and commit undo before reporting failure
//! - Rollback is always safe and never fails
//! - Enlisted resources hear every transaction outcome exactly once
//!
//! This module provides:
//! - `CommitContext` / `Scope` - the two binding scopes
//! - `ItemStateManager` / `UpdatableStateManager` - read/write contracts
//! - `TransactionResource` - outcome callbacks for derived state
//! - `TransactionalOverlay` - buffered reads and deferred writes
//! - `Transaction` - a two-phase driver over an overlay

mod context;
mod errors;
mod manager;
mod overlay;
mod resource;
mod transaction;

pub use context::{CommitContext, Scope};
pub use errors::{TransactionError, TxnResult};
pub use manager::{ItemStateManager, UpdatableStateManager};
pub use overlay::TransactionalOverlay;
pub use resource::TransactionResource;
pub use transaction::{Transaction, TransactionStatus};
