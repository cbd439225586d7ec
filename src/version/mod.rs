//! Version graph subsystem
//!
//! A version history is a DAG of immutable versions linked by
//! predecessor/successor edges, with labels as named indirections.
//!
//! # Design Principles
//!
//! - The history arena is the single owner of version records
//! - Edges are id lists, never object links
//! - Every graph edit is one change log applied through an item state manager
//! - Navigation and mutation share one reader/writer lock per history
//!
//! This module provides:
//! - `Version` - a node with edge lists and a label cache
//! - `VersionHistory` - creation, checkin, navigation, surgery, labels
//! - `GraphReport` - invariant verification results

mod edit;
mod errors;
mod history;
pub mod names;
mod naming;
mod record;
mod verify;

pub use errors::{VersionError, VersionResult};
pub use history::VersionHistory;
pub use naming::next_version_name;
pub use record::Version;
pub use verify::{GraphProblem, GraphReport};
