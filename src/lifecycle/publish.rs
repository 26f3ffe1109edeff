//! Publishing the chosen edges for each zone.
//!
//! Zone files themselves are rendered outside edgekeeper. What is published
//! here is a per-zone manifest a renderer can consume.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::health::timestamp::Timestamp;
use crate::store::atomic::write_json_atomic;

/// Everything a renderer needs to produce one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneManifest {
    pub zone: String,
    pub dnet: String,
    /// Live edges, sorted.
    pub edges: Vec<String>,
    pub canary: Option<String>,
    /// SOA serial for the rendered zone (epoch seconds of the cycle).
    pub serial: i64,
    pub generated_at: Timestamp,
}

/// Receives the zones that need rewriting.
pub trait ZonePublisher: Send + Sync {
    fn publish(&self, manifest: &ZoneManifest) -> io::Result<()>;
}

/// Writes `<output_dir>/<zone>.live.json` atomically.
#[derive(Debug, Clone)]
pub struct ManifestPublisher {
    output_dir: PathBuf,
}

impl ManifestPublisher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn manifest_path(&self, zone: &str) -> PathBuf {
        self.output_dir.join(format!("{zone}.live.json"))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl ZonePublisher for ManifestPublisher {
    fn publish(&self, manifest: &ZoneManifest) -> io::Result<()> {
        let path = self.manifest_path(&manifest.zone);
        write_json_atomic(&path, manifest)?;
        tracing::info!(
            zone = %manifest.zone,
            path = %path.display(),
            edges = ?manifest.edges,
            canary = ?manifest.canary,
            "Wrote zone manifest"
        );
        Ok(())
    }
}

/// Dry-run publisher: logs what would have been written.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

impl ZonePublisher for LogPublisher {
    fn publish(&self, manifest: &ZoneManifest) -> io::Result<()> {
        tracing::info!(
            zone = %manifest.zone,
            edges = ?manifest.edges,
            canary = ?manifest.canary,
            serial = manifest.serial,
            "Dry run, not writing zone manifest"
        );
        Ok(())
    }
}
