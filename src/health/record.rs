//! Per-edge health record.
//!
//! # Responsibilities
//! - Hold a bounded time series of probe latencies for one edge
//! - Hold the operator mode and the selector-owned state/health labels
//! - Persist itself atomically after every mutation
//!
//! # Design Decisions
//! - Every stored field defaults independently, so records written by older
//!   versions load without migration
//! - Setters skip the write when the value is unchanged
//! - A record opened with `nowrite` never touches disk (dry runs)

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::health::tier::{LiveState, Mode, Tier};
use crate::health::timestamp::{series, Timestamp};
use crate::store::atomic::write_json_atomic;

/// Default number of samples retained per edge.
pub const FETCH_HISTORY: usize = 2000;

/// File extension of record files.
pub const RECORD_EXTENSION: &str = "edgestore";

const STORED_FIELDS: [&str; 8] = [
    "fetch_times",
    "historical_average",
    "rotation_history",
    "state",
    "mode",
    "health",
    "state_entry_time",
    "comment",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct StoredRecord {
    #[serde(with = "series")]
    fetch_times: BTreeMap<Timestamp, f64>,
    #[serde(with = "series")]
    historical_average: BTreeMap<Timestamp, f64>,
    rotation_history: Vec<Timestamp>,
    state: LiveState,
    mode: Mode,
    health: Tier,
    state_entry_time: Option<Timestamp>,
    comment: String,
}

/// How records are opened.
#[derive(Debug, Clone, Copy)]
pub struct RecordOptions {
    /// Samples retained per edge.
    pub history: usize,
    /// Never write to disk.
    pub nowrite: bool,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            history: FETCH_HISTORY,
            nowrite: false,
        }
    }
}

/// Health history and labels for one edge.
#[derive(Debug, Clone)]
pub struct EdgeHealthRecord {
    edge: String,
    path: PathBuf,
    options: RecordOptions,
    data: StoredRecord,
}

impl EdgeHealthRecord {
    /// Path of the record file for `edge` under `store_dir`.
    pub fn path_for(store_dir: &Path, edge: &str) -> Result<PathBuf, StoreError> {
        if edge.is_empty() || edge.contains(['/', '\\']) || edge.starts_with('.') {
            return Err(StoreError::InvalidName(edge.to_string()));
        }
        Ok(store_dir.join(format!("{edge}.{RECORD_EXTENSION}")))
    }

    /// Load the record for `edge`, or start an empty one if none exists.
    ///
    /// A present but unparsable file is an error; the caller decides whether
    /// to skip the edge.
    pub fn load(store_dir: &Path, edge: &str, options: RecordOptions) -> Result<Self, StoreError> {
        let path = Self::path_for(store_dir, edge)?;
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::io(path, e)),
        };

        if raw.iter().all(u8::is_ascii_whitespace) {
            tracing::warn!(edge = %edge, "Initialising previously untracked edge");
            return Ok(Self {
                edge: edge.to_string(),
                path,
                options,
                data: StoredRecord::default(),
            });
        }

        let value: serde_json::Value =
            serde_json::from_slice(&raw).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?;
        if let Some(object) = value.as_object() {
            for field in STORED_FIELDS {
                if !object.contains_key(field) {
                    tracing::warn!(
                        edge = %edge,
                        field,
                        "Edge record lacks field, using default"
                    );
                }
            }
        }
        let mut data: StoredRecord =
            serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?;
        trim_oldest(&mut data.fetch_times, options.history);
        trim_oldest(&mut data.historical_average, options.history);

        Ok(Self {
            edge: edge.to_string(),
            path,
            options,
            data,
        })
    }

    /// An empty record that never persists.
    pub fn detached(edge: &str, history: usize) -> Self {
        Self {
            edge: edge.to_string(),
            path: PathBuf::new(),
            options: RecordOptions {
                history,
                nowrite: true,
            },
            data: StoredRecord::default(),
        }
    }

    pub fn edge(&self) -> &str {
        &self.edge
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.data.mode
    }

    pub fn state(&self) -> LiveState {
        self.data.state
    }

    pub fn health(&self) -> Tier {
        self.data.health
    }

    pub fn comment(&self) -> &str {
        &self.data.comment
    }

    pub fn state_entry_time(&self) -> Option<Timestamp> {
        self.data.state_entry_time
    }

    pub fn fetch_times(&self) -> &BTreeMap<Timestamp, f64> {
        &self.data.fetch_times
    }

    pub fn historical_average(&self) -> &BTreeMap<Timestamp, f64> {
        &self.data.historical_average
    }

    pub fn rotation_history(&self) -> &[Timestamp] {
        &self.data.rotation_history
    }

    pub fn len(&self) -> usize {
        self.data.fetch_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.fetch_times.is_empty()
    }

    /// Record a sample taken now.
    pub fn add_value(&mut self, value: f64) -> Result<Timestamp, StoreError> {
        self.add_value_at(value, Timestamp::now())
    }

    /// Record a sample taken at `at`, evicting the oldest past the bound.
    pub fn add_value_at(&mut self, value: f64, at: Timestamp) -> Result<Timestamp, StoreError> {
        self.data.fetch_times.insert(at, value);
        if let Some(evicted) = trim_oldest(&mut self.data.fetch_times, self.options.history) {
            tracing::debug!(
                edge = %self.edge,
                evicted = %evicted,
                limit = self.options.history,
                "Rotated out oldest fetch time"
            );
        }

        if at.is_top_of_hour() {
            let boundary = at.hour_boundary();
            if !self.data.historical_average.contains_key(&boundary) {
                if let Some(average) = self.current_average() {
                    self.data.historical_average.insert(boundary, average);
                    trim_oldest(&mut self.data.historical_average, self.options.history);
                }
            }
        }

        self.persist()?;
        Ok(at)
    }

    /// Mean of every retained sample; timeouts count at full value.
    pub fn current_average(&self) -> Option<f64> {
        mean(self.data.fetch_times.values().copied())
    }

    /// The sample with the latest timestamp.
    pub fn last_value(&self) -> Option<f64> {
        self.data
            .fetch_times
            .last_key_value()
            .map(|(_, value)| *value)
    }

    /// Samples with timestamps inside `range`, oldest first.
    pub fn slice(&self, range: RangeInclusive<Timestamp>) -> impl Iterator<Item = (Timestamp, f64)> + '_ {
        let samples = if range.start() <= range.end() {
            Some(self.data.fetch_times.range(range))
        } else {
            None
        };
        samples
            .into_iter()
            .flatten()
            .map(|(ts, value)| (*ts, *value))
    }

    /// Mean of the samples in the `window` ending at `now`, if any.
    pub fn window_average(&self, now: Timestamp, window: Duration) -> Option<f64> {
        mean(
            self.slice(now.saturating_sub(window)..=now)
                .map(|(_, value)| value),
        )
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<bool, StoreError> {
        self.set_mode_at(mode, Timestamp::now())
    }

    /// Change the operator mode, noting when the transition happened.
    pub fn set_mode_at(&mut self, mode: Mode, at: Timestamp) -> Result<bool, StoreError> {
        if self.data.mode == mode {
            return Ok(false);
        }
        tracing::info!(edge = %self.edge, from = %self.data.mode, to = %mode, "Edge mode changed");
        self.data.mode = mode;
        self.data.state_entry_time = Some(at);
        self.persist()?;
        Ok(true)
    }

    pub fn set_state(&mut self, state: LiveState) -> Result<bool, StoreError> {
        if self.data.state == state {
            return Ok(false);
        }
        tracing::debug!(edge = %self.edge, state = %state, "Setting edge state");
        self.data.state = state;
        self.persist()?;
        Ok(true)
    }

    pub fn set_health(&mut self, health: Tier) -> Result<bool, StoreError> {
        if self.data.health == health {
            return Ok(false);
        }
        tracing::debug!(edge = %self.edge, health = %health, "Setting edge health");
        self.data.health = health;
        self.persist()?;
        Ok(true)
    }

    pub fn set_comment(&mut self, comment: &str) -> Result<bool, StoreError> {
        if self.data.comment == comment {
            return Ok(false);
        }
        self.data.comment = comment.to_string();
        self.persist()?;
        Ok(true)
    }

    /// Note that the edge entered rotation at `at`.
    pub fn add_rotation(&mut self, at: Timestamp) -> Result<(), StoreError> {
        self.data.rotation_history.push(at);
        let excess = self
            .data
            .rotation_history
            .len()
            .saturating_sub(self.options.history);
        self.data.rotation_history.drain(..excess);
        self.persist()
    }

    fn persist(&self) -> Result<(), StoreError> {
        if self.options.nowrite {
            tracing::trace!(edge = %self.edge, "Not writing record (nowrite)");
            return Ok(());
        }
        write_json_atomic(&self.path, &self.data).map_err(|e| StoreError::io(&self.path, e))
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Drop the oldest entries until at most `limit` remain; returns the last evicted key.
fn trim_oldest(map: &mut BTreeMap<Timestamp, f64>, limit: usize) -> Option<Timestamp> {
    let mut evicted = None;
    while map.len() > limit {
        evicted = map.pop_first().map(|(ts, _)| ts);
    }
    evicted
}
