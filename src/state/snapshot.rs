//! Snapshot persistence for `MemoryStateStore`
//!
//! A snapshot file is a JSON envelope:
//!
//! ```text
//! {"format":"versionvault-snapshot","format_version":1,"checksum":<crc32>,"body":"<json>"}
//! ```
//!
//! The body lists states and references sorted by id so that saving the
//! same contents twice yields identical bytes. The checksum covers the
//! body string exactly as stored.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::observability::{log_event_with_fields, Event};

use super::checksum::{compute_checksum, verify_checksum};
use super::entity::{EntityState, NodeReferences};
use super::errors::{StateError, StateResult};
use super::store::{MemoryStateStore, StoreContents};

const SNAPSHOT_FORMAT: &str = "versionvault-snapshot";
const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format: String,
    format_version: u32,
    checksum: u32,
    body: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotBody {
    states: Vec<EntityState>,
    references: Vec<NodeReferences>,
}

impl MemoryStateStore {
    /// Writes the committed contents to `path`.
    ///
    /// The file is written to a sibling temp file, fsynced, then renamed
    /// over `path`.
    pub fn save_snapshot(&self, path: &Path) -> StateResult<()> {
        let (body, count) = {
            let contents = self.read_contents();
            let mut states: Vec<EntityState> = contents.states.values().cloned().collect();
            states.sort_by_key(|s| s.id());
            let mut references: Vec<NodeReferences> =
                contents.references.values().cloned().collect();
            references.sort_by_key(|r| r.target());
            let count = states.len();
            (serde_json::to_string(&SnapshotBody { states, references })?, count)
        };

        let envelope = Envelope {
            format: SNAPSHOT_FORMAT.to_string(),
            format_version: SNAPSHOT_FORMAT_VERSION,
            checksum: compute_checksum(body.as_bytes()),
            body,
        };
        let bytes = serde_json::to_vec(&envelope)?;

        let tmp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path).map_err(|e| {
                StateError::io(format!("Failed to create {}", tmp_path.display()), e)
            })?;
            file.write_all(&bytes)
                .map_err(|e| StateError::io("Failed to write snapshot", e))?;
            file.sync_all()
                .map_err(|e| StateError::io("Failed to fsync snapshot", e))?;
        }
        fs::rename(&tmp_path, path).map_err(|e| {
            StateError::io(format!("Failed to move snapshot into {}", path.display()), e)
        })?;

        log_event_with_fields(
            Event::SnapshotSaved,
            &[("path", &path.display().to_string()), ("states", &count.to_string())],
        );
        Ok(())
    }

    /// Opens a store from a snapshot written by `save_snapshot`.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Corruption` on a format or checksum mismatch.
    pub fn open_snapshot(path: &Path) -> StateResult<Self> {
        let bytes = fs::read(path)
            .map_err(|e| StateError::io(format!("Failed to read {}", path.display()), e))?;
        let envelope: Envelope = serde_json::from_slice(&bytes)
            .map_err(|e| StateError::Corruption(format!("unreadable envelope: {}", e)))?;

        if envelope.format != SNAPSHOT_FORMAT {
            return Err(StateError::Corruption(format!(
                "unexpected format '{}'",
                envelope.format
            )));
        }
        if envelope.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(StateError::Corruption(format!(
                "unsupported format version {}",
                envelope.format_version
            )));
        }
        if !verify_checksum(envelope.body.as_bytes(), envelope.checksum) {
            return Err(StateError::Corruption(format!(
                "checksum mismatch in {}",
                path.display()
            )));
        }

        let body: SnapshotBody = serde_json::from_str(&envelope.body)?;
        let mut contents = StoreContents::default();
        for state in body.states {
            contents.states.insert(state.id(), state);
        }
        for refs in body.references {
            contents.references.insert(refs.target(), refs);
        }

        log_event_with_fields(
            Event::SnapshotOpened,
            &[
                ("path", &path.display().to_string()),
                ("states", &contents.states.len().to_string()),
            ],
        );
        Ok(Self::from_contents(contents))
    }
}
