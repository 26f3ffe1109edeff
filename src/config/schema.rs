//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for edgekeeper.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EdgeConfig {
    /// Filesystem locations for inputs, stores and outputs.
    pub paths: PathsConfig,

    /// How edges are probed.
    pub probe: ProbeConfig,

    /// Judgement and selection policy.
    pub decision: DecisionConfig,

    /// Canary edges per dnet: dnet → (zone → canary edge).
    pub canaries: BTreeMap<String, BTreeMap<String, String>>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl EdgeConfig {
    /// Zone → canary edge mapping for one dnet (empty if none configured).
    pub fn canaries_for(&self, dnet: &str) -> BTreeMap<String, String> {
        self.canaries.get(dnet).cloned().unwrap_or_default()
    }
}

/// Filesystem layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding one edge list file per dnet.
    pub edgelist_dir: PathBuf,

    /// Directory holding one `<edge>.edgestore` record per edge.
    pub healthdata_store: PathBuf,

    /// Directory holding one `<dnet>.state.json` document per dnet.
    pub state_dir: PathBuf,

    /// Directory holding `<dnet>/<zone>.zone` templates.
    pub zonetemplate_dir: PathBuf,

    /// Directory receiving published zone manifests.
    pub output_dir: PathBuf,

    /// Lockfile guarding against overlapping cycles.
    pub lockfile: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            edgelist_dir: PathBuf::from("/etc/edgekeeper/edges"),
            healthdata_store: PathBuf::from("/var/lib/edgekeeper/health"),
            state_dir: PathBuf::from("/var/lib/edgekeeper/state"),
            zonetemplate_dir: PathBuf::from("/etc/edgekeeper/zones"),
            output_dir: PathBuf::from("/var/lib/edgekeeper/out"),
            lockfile: PathBuf::from("/var/lock/edgekeeper.lock"),
        }
    }
}

/// Probe target and transport settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Host header sent with every probe.
    pub host: String,

    /// Path of the test object on each edge.
    pub path: String,

    /// URL scheme, `http` or `https`.
    pub scheme: String,

    /// Port the edges serve the test object on.
    pub port: u16,

    /// Verify TLS certificates.
    pub verify_tls: bool,

    /// Local reference copy of the test object.
    pub local_object: PathBuf,

    /// Maximum number of probes in flight.
    pub workers: usize,

    /// Per-probe timeout in seconds; also the latency recorded for a timeout.
    pub fetch_timeout_secs: f64,

    /// Total connection attempts per probe.
    pub fetch_retry: u32,

    /// Base delay between connection attempts in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Cap on the delay between connection attempts in milliseconds.
    pub retry_max_delay_ms: u64,

    /// Send the edge name as the Host header (test environments).
    pub host_header_from_edge: bool,
}

impl ProbeConfig {
    /// The per-probe timeout.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.fetch_timeout_secs).unwrap_or(Duration::MAX)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            path: "/edgetest.txt".to_string(),
            scheme: "https".to_string(),
            port: 80,
            verify_tls: false,
            local_object: PathBuf::from("/etc/edgekeeper/edgetest.txt"),
            workers: 10,
            fetch_timeout_secs: 10.0,
            fetch_retry: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 1000,
            host_header_from_edge: false,
        }
    }
}

/// Judgement and live-set selection policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Latency in seconds below which a probe counts as healthy.
    pub good_enough: f64,

    /// Number of live edges to advertise.
    pub edge_count: usize,

    /// Per-dnet overrides of `edge_count`.
    pub dnet_edge_count: BTreeMap<String, usize>,

    /// Failed canaries that trip the canary kill-switch. Unset disables it.
    pub canary_killer: Option<usize>,

    /// Length of the short averaging window in seconds.
    pub window_secs: u64,

    /// Samples retained per edge.
    pub fetch_history: usize,

    /// Live-set change timestamps retained in the run state.
    pub max_rotations: usize,
}

impl DecisionConfig {
    /// Live edges required for `dnet`, honoring per-dnet overrides.
    pub fn required_edge_count(&self, dnet: &str) -> usize {
        self.dnet_edge_count
            .get(dnet)
            .copied()
            .unwrap_or(self.edge_count)
    }

    /// The short averaging window.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            good_enough: 1.0,
            edge_count: 4,
            dnet_edge_count: BTreeMap::new(),
            canary_killer: None,
            window_secs: 300,
            fetch_history: 2000,
            max_rotations: 100,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Write Prometheus text-format metrics here after each cycle.
    pub metrics_textfile: Option<PathBuf>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_textfile: None,
        }
    }
}
