//! Per-dnet inputs that live next to the configuration file.
//!
//! The edge list is a flat file, one edge per line, `#` for comments.
//! Zone templates are only inspected for their modification times; rendering
//! them is left to whoever consumes the published zone manifests.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Read the edge list for `dnet` from `edgelist_dir`.
pub fn read_edge_list(edgelist_dir: &Path, dnet: &str) -> io::Result<Vec<String>> {
    let content = fs::read_to_string(edgelist_dir.join(dnet))?;
    Ok(parse_edge_list(&content))
}

/// Parse edge list text, dropping blanks, comments and duplicates.
pub fn parse_edge_list(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect()
}

/// Modification times (whole epoch seconds) of `<dir>/<dnet>/*.zone`, keyed by zone name.
///
/// A missing template directory yields an empty map.
pub fn zone_mtimes(zonetemplate_dir: &Path, dnet: &str) -> io::Result<BTreeMap<String, i64>> {
    let dir = zonetemplate_dir.join(dnet);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(dir = %dir.display(), "No zone template directory");
            return Ok(BTreeMap::new());
        }
        Err(e) => return Err(e),
    };

    let mut mtimes = BTreeMap::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("zone") {
            continue;
        }
        let Some(zone) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let modified = fs::metadata(&path)?.modified()?;
        let secs = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        mtimes.insert(zone.to_string(), secs);
    }
    Ok(mtimes)
}
