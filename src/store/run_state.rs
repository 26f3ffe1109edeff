//! Per-dnet run state, carried from one cycle to the next.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::health::timestamp::Timestamp;
use crate::store::atomic::write_json_atomic;

/// What the previous cycle decided.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunState {
    /// Live edges chosen last cycle.
    pub last_live: Vec<String>,
    /// Zone → canary edge in use.
    pub active_canaries: BTreeMap<String, String>,
    /// Zone → template mtime (epoch seconds) seen last cycle.
    pub zone_mtimes: BTreeMap<String, i64>,
    /// When the live set last changed, oldest first.
    pub rotation_list: Vec<Timestamp>,
    /// When the last cycle completed.
    pub last_run: Option<Timestamp>,
    /// Edges that served the wrong content last cycle.
    pub verification_failures: Vec<String>,
}

impl RunState {
    /// Location of the state document for `dnet`.
    pub fn path_for(state_dir: &Path, dnet: &str) -> PathBuf {
        state_dir.join(format!("{dnet}.state.json"))
    }

    /// Read the state document; a missing file is an empty state.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "No run state found, starting fresh");
                return Ok(Self::default());
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };
        serde_json::from_slice(&raw).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        write_json_atomic(path, self).map_err(|e| StoreError::io(path, e))
    }

    /// The most recent live-set change, if any.
    pub fn last_rotation(&self) -> Option<Timestamp> {
        self.rotation_list.last().copied()
    }

    /// Note a live-set change, keeping at most `max_rotations` entries.
    pub fn add_rotation(&mut self, at: Timestamp, max_rotations: usize) {
        self.rotation_list.push(at);
        let excess = self.rotation_list.len().saturating_sub(max_rotations);
        self.rotation_list.drain(..excess);
    }

    pub fn set_last_run(&mut self, at: Timestamp) {
        self.last_run = Some(at);
    }
}
