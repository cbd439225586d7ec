//! Item state manager contracts
//!
//! Readers of entity state (the version graph among them) depend on these
//! traits rather than on a concrete overlay.

use std::sync::Arc;

use uuid::Uuid;

use crate::state::{ChangeLog, EntityId, EntityState, NodeReferences, StateResult};

use super::errors::TxnResult;
use super::resource::TransactionResource;

/// Read access to entity states and references.
pub trait ItemStateManager {
    /// Returns the visible state of an entity.
    fn get_item_state(&self, id: &EntityId) -> StateResult<EntityState>;

    /// Returns whether the entity is visible.
    fn has_item_state(&self, id: &EntityId) -> bool;

    /// Returns the visible references record of a target.
    fn get_node_references(&self, id: &EntityId) -> StateResult<NodeReferences>;

    /// Returns whether a references record is visible.
    fn has_node_references(&self, id: &EntityId) -> bool;

    /// Transaction that buffers this manager's updates.
    ///
    /// `None` means an update reaches the shared store before it returns.
    /// Managers that report a transaction must also honour `enlist`.
    fn transaction_id(&self) -> Option<Uuid> {
        None
    }
}

/// Read and write access; writes arrive as whole change logs.
pub trait UpdatableStateManager: ItemStateManager {
    /// Persists or buffers a batch of mutations.
    fn update(&mut self, log: ChangeLog) -> TxnResult<()>;

    /// Registers `resource` to hear how the current transaction ends.
    ///
    /// Ignored when no transaction buffers the updates.
    fn enlist(&mut self, _resource: Arc<dyn TransactionResource>) {}
}
