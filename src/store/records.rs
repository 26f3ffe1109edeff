//! Loading the health records of a dnet's edges.

use std::collections::HashMap;
use std::path::Path;

use crate::health::record::{EdgeHealthRecord, RecordOptions};

/// Records loaded for one cycle.
#[derive(Debug, Default)]
pub struct LoadedRecords {
    /// Usable records keyed by edge name.
    pub records: HashMap<String, EdgeHealthRecord>,
    /// Edges whose record could not be loaded; excluded from this cycle.
    pub failed: Vec<String>,
}

/// Load (or initialise) the record of every edge in `edges`.
///
/// A record that fails to load is logged and skipped so one bad file never
/// stops the cycle.
pub fn load_records(store_dir: &Path, edges: &[String], options: RecordOptions) -> LoadedRecords {
    let mut loaded = LoadedRecords::default();
    for edge in edges {
        match EdgeHealthRecord::load(store_dir, edge, options) {
            Ok(record) => {
                loaded.records.insert(edge.clone(), record);
            }
            Err(e) => {
                tracing::error!(edge = %edge, error = %e, "Failed to load edge record, skipping edge");
                loaded.failed.push(edge.clone());
            }
        }
    }
    tracing::debug!(
        loaded = loaded.records.len(),
        failed = loaded.failed.len(),
        "Loaded edge records"
    );
    loaded
}
