//! CLI module for versionvault
//!
//! Provides maintenance commands over a store snapshot:
//! - init: Create a snapshot holding one version history
//! - verify: Report version graph invariant violations
//! - repair: Commit missing successor edges
//! - show: Print a history as JSON

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{init, repair, run, run_command, show, verify};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
