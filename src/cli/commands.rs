//! CLI command implementations
//!
//! Every command loads the configuration, opens the snapshot named there
//! and works through a `TransactionalOverlay` over the restored store.
//! Only `init` and `repair` write the snapshot back.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::VaultConfig;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry, ObservationScope};
use crate::state::{EntityId, MemoryStateStore, StateError};
use crate::txn::TransactionalOverlay;
use crate::version::{GraphReport, Version, VersionHistory};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments, dispatches the command and reports failures as an
/// error response before returning them to `main`.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    let result = run_command(cli.command);
    if let Err(e) = &result {
        write_error(e.code_str(), e.message())?;
    }
    result
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config } => write_response(init(&config)?),
        Command::Verify { config, history } => {
            let report = verify(&config, history)?;
            write_response(serde_json::to_value(&report)?)?;
            if !report.is_consistent() {
                return Err(CliError::graph_inconsistent(report.problems.len()));
            }
            Ok(())
        }
        Command::Repair { config, history } => write_response(repair(&config, history)?),
        Command::Show { config, history } => write_response(show(&config, history)?),
    }
}

fn load_config(config_path: &Path) -> CliResult<VaultConfig> {
    let config = VaultConfig::load(config_path)?;
    config.apply_logging()?;
    Ok(config)
}

fn open_store(config: &VaultConfig) -> CliResult<Arc<MemoryStateStore>> {
    let path = config.snapshot_path();
    if !path.exists() {
        return Err(CliError::not_initialized(&config.snapshot_path));
    }
    match MemoryStateStore::open_snapshot(path) {
        Ok(store) => Ok(Arc::new(store)),
        Err(e) => {
            if let StateError::Corruption(reason) = &e {
                log_event_with_fields(
                    Event::SnapshotCorruption,
                    &[("path", &config.snapshot_path), ("reason", reason)],
                );
            }
            Err(e.into())
        }
    }
}

fn open_history(
    config: &VaultConfig,
    overlay: &TransactionalOverlay<MemoryStateStore>,
    id: EntityId,
) -> CliResult<VersionHistory> {
    let history = VersionHistory::load(overlay, id)?.with_max_walk_factor(config.max_walk_factor);
    if config.verify_on_open {
        // verify logs any problems it finds
        history.verify(overlay)?;
    }
    Ok(history)
}

/// Creates the snapshot with one fresh version history.
///
/// Refuses to overwrite an existing snapshot.
pub fn init(config_path: &Path) -> CliResult<Value> {
    let config = load_config(config_path)?;
    if config.snapshot_path().exists() {
        return Err(CliError::already_initialized(&config.snapshot_path));
    }

    let store = Arc::new(MemoryStateStore::new());
    let mut overlay = TransactionalOverlay::new(store.clone());
    let history = VersionHistory::create(&mut overlay)?;
    let root = history.root_version()?;
    store.save_snapshot(config.snapshot_path())?;

    Ok(json!({
        "initialized": true,
        "history": history.id(),
        "root_version": root.id(),
    }))
}

/// Verifies the graph of one history.
pub fn verify(config_path: &Path, history: EntityId) -> CliResult<GraphReport> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let overlay = TransactionalOverlay::new(store);
    let history = VersionHistory::load(&overlay, history)?
        .with_max_walk_factor(config.max_walk_factor);
    Ok(history.verify(&overlay)?)
}

/// Derives missing successor edges and commits them in one transaction.
pub fn repair(config_path: &Path, history_id: EntityId) -> CliResult<Value> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let metrics = Arc::new(MetricsRegistry::new());
    let mut overlay = TransactionalOverlay::new(store.clone()).with_metrics(metrics.clone());
    let history = open_history(&config, &overlay, history_id)?.with_metrics(metrics.clone());

    let id = history_id.to_string();
    let scope = ObservationScope::with_fields("GRAPH_REPAIR", &[("history_id", &id)]);

    let repairs = match history.legacy_resolve_all(&overlay) {
        Ok(repairs) => repairs,
        Err(e) => {
            scope.fail(e.code());
            return Err(e.into());
        }
    };
    let repaired = repairs.len();

    if repaired > 0 {
        let mut txn = overlay.begin()?;
        let committed = txn
            .overlay_mut()
            .update(repairs)
            .and_then(|()| txn.commit());
        if let Err(e) = committed {
            scope.fail(e.code());
            return Err(e.into());
        }
        store.save_snapshot(config.snapshot_path())?;
        history.reload(&overlay)?;
    }

    let report = history.verify(&overlay)?;
    scope.complete_with_fields(&[("repaired", &repaired.to_string())]);

    Ok(json!({
        "history": history.id(),
        "repaired_entities": repaired,
        "consistent": report.is_consistent(),
        "graph_repairs": metrics.snapshot().graph_repairs,
    }))
}

fn version_json(version: &Version) -> Value {
    json!({
        "id": version.id(),
        "name": version.name(),
        "created": version.created().to_rfc3339(),
        "root": version.is_root(),
        "predecessors": version.predecessor_ids(),
        "successors": version.successor_ids(),
        "labels": version.labels(),
        "frozen_node": version.frozen_node_id(),
    })
}

/// Prints every version of a history with its edges and labels.
pub fn show(config_path: &Path, history_id: EntityId) -> CliResult<Value> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let overlay = TransactionalOverlay::new(store);
    let history = open_history(&config, &overlay, history_id)?;

    let versions: Vec<Value> = history.versions()?.iter().map(version_json).collect();
    Ok(json!({
        "history": history.id(),
        "root_version": history.root_version()?.id(),
        "versions": versions,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::errors::CliErrorCode;
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_config(temp_dir: &TempDir) -> PathBuf {
        let config_path = temp_dir.path().join("versionvault.json");
        let snapshot = temp_dir.path().join("vault.snapshot");
        let config = json!({ "snapshot_path": snapshot.to_string_lossy() });
        fs::write(&config_path, config.to_string()).unwrap();
        config_path
    }

    fn history_of(value: &Value) -> EntityId {
        value["history"].as_str().unwrap().parse().unwrap()
    }

    #[test]
    fn test_init_creates_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir);

        let out = init(&config_path).unwrap();
        assert_eq!(out["initialized"], true);
        assert!(temp_dir.path().join("vault.snapshot").exists());

        let report = verify(&config_path, history_of(&out)).unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.versions, 1);
    }

    #[test]
    fn test_init_refuses_reinit() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir);
        init(&config_path).unwrap();

        let err = init(&config_path).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::AlreadyInitialized);
    }

    #[test]
    fn test_show_requires_init() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir);

        let err = show(&config_path, EntityId::new()).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::NotInitialized);
    }

    #[test]
    fn test_show_lists_root() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir);
        let out = init(&config_path).unwrap();

        let shown = show(&config_path, history_of(&out)).unwrap();
        assert_eq!(shown["root_version"], out["root_version"]);
        assert_eq!(shown["versions"].as_array().unwrap().len(), 1);
        assert_eq!(shown["versions"][0]["root"], true);
    }

    #[test]
    fn test_unknown_history_fails() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir);
        init(&config_path).unwrap();

        let err = verify(&config_path, EntityId::new()).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::OperationFailed);
    }

    #[test]
    fn test_corrupt_snapshot_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir);
        let out = init(&config_path).unwrap();
        fs::write(temp_dir.path().join("vault.snapshot"), b"{ not json").unwrap();

        let err = show(&config_path, history_of(&out)).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::SnapshotCorrupted);
    }
}
