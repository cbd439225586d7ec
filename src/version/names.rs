//! Persisted layout of version histories
//!
//! History entity:
//! - one child entry per version, named by the version name
//! - `rootVersion`: weak reference to the root version
//! - `label.<name>`: reference to the labelled version
//!
//! Version entity:
//! - `versionName`, `created`, `versionHistory`
//! - `predecessors` / `successors`: weak references, in edge order
//! - child entry `frozenNode`

pub const HISTORY_KIND: &str = "vv:versionHistory";
pub const VERSION_KIND: &str = "vv:version";
pub const FROZEN_NODE_KIND: &str = "vv:frozenNode";

pub const ROOT_VERSION: &str = "rootVersion";
pub const LABEL_PREFIX: &str = "label.";

pub const VERSION_NAME: &str = "versionName";
pub const CREATED: &str = "created";
pub const VERSION_HISTORY: &str = "versionHistory";
pub const PREDECESSORS: &str = "predecessors";
pub const SUCCESSORS: &str = "successors";
pub const FROZEN_NODE: &str = "frozenNode";

/// Name given to the root version of every history.
pub const ROOT_VERSION_NAME: &str = "root";

/// Property holding `label` on the history entity.
pub fn label_property(label: &str) -> String {
    format!("{}{}", LABEL_PREFIX, label)
}
