//! versionvault - transactional, versioned content-graph storage
//!
//! Two tightly coupled layers:
//! - a transactional overlay that buffers entity mutations per transaction
//!   and commits them atomically against a shared state store
//! - a version graph (a DAG of versions with predecessor/successor edges
//!   and labels) whose edits are themselves transactional mutations

pub mod cli;
pub mod config;
pub mod observability;
pub mod state;
pub mod txn;
pub mod version;
