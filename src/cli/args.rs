//! CLI argument definitions using clap
//!
//! Commands:
//! - versionvault init --config <path>
//! - versionvault verify --config <path> --history <id>
//! - versionvault repair --config <path> --history <id>
//! - versionvault show --config <path> --history <id>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::state::EntityId;

/// versionvault - transactional version graph maintenance
#[derive(Parser, Debug)]
#[command(name = "versionvault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a snapshot holding one fresh version history
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./versionvault.json")]
        config: PathBuf,
    },

    /// Check a history's graph invariants and print the report
    Verify {
        /// Path to configuration file
        #[arg(long, default_value = "./versionvault.json")]
        config: PathBuf,

        /// Id of the version history
        #[arg(long)]
        history: EntityId,
    },

    /// Derive missing successor edges and commit them
    Repair {
        /// Path to configuration file
        #[arg(long, default_value = "./versionvault.json")]
        config: PathBuf,

        /// Id of the version history
        #[arg(long)]
        history: EntityId,
    },

    /// Print a history's versions and edges as JSON
    Show {
        /// Path to configuration file
        #[arg(long, default_value = "./versionvault.json")]
        config: PathBuf,

        /// Id of the version history
        #[arg(long)]
        history: EntityId,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_history_id() {
        let id = EntityId::new();
        let cli = Cli::try_parse_from([
            "versionvault",
            "verify",
            "--config",
            "vault.config.json",
            "--history",
            &id.to_string(),
        ])
        .unwrap();

        match cli.command {
            Command::Verify { history, config } => {
                assert_eq!(history, id);
                assert_eq!(config, PathBuf::from("vault.config.json"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_malformed_history_id() {
        let result = Cli::try_parse_from(["versionvault", "show", "--history", "not-a-uuid"]);
        assert!(result.is_err());
    }
}
