//! Atomic checkpoint persistence.
//!
//! Checkpoints are written to a temp file in the same directory and
//! renamed over the previous one, so a crash mid-write can never corrupt
//! the resume point. The file carries a schema version; an incompatible
//! version fails fast instead of resuming with misread state.

use crate::error::StorageError;
use crate::session::SessionState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Checkpoint {
    schema_version: u32,
    state: SessionState,
}

pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write a snapshot. The caller assigns `checkpoint_seq` before
    /// handing the state over; the store only persists it.
    pub fn write(&self, state: &SessionState) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let checkpoint = Checkpoint {
            schema_version: SCHEMA_VERSION,
            state: state.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&checkpoint)?;

        let temp = self.temp_path();
        fs::write(&temp, &bytes)?;
        fs::rename(&temp, &self.path)?;

        debug!(
            seq = state.checkpoint_seq,
            pending = state.pending(),
            visited = state.visited.len(),
            "checkpoint written"
        );
        Ok(())
    }

    /// Load the last checkpoint, or `None` when no run was saved here.
    pub fn load(&self) -> Result<Option<SessionState>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;

        // check the version before trusting the rest of the layout
        #[derive(Deserialize)]
        struct VersionProbe {
            schema_version: u32,
        }
        let probe: VersionProbe = serde_json::from_slice(&bytes)?;
        if probe.schema_version != SCHEMA_VERSION {
            return Err(StorageError::SchemaVersion {
                found: probe.schema_version,
                expected: SCHEMA_VERSION,
            });
        }

        let checkpoint: Checkpoint = serde_json::from_slice(&bytes)?;
        info!(
            seq = checkpoint.state.checkpoint_seq,
            pending = checkpoint.state.pending(),
            visited = checkpoint.state.visited.len(),
            "checkpoint loaded"
        );
        Ok(Some(checkpoint.state))
    }

    pub fn remove(&self) -> Result<(), StorageError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
