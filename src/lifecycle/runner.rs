//! One full decision cycle for one dnet.
//!
//! # Steps
//! ```text
//! lock → hash reference object → edge list, canaries, zone mtimes
//!      → RunState → records → probe → select + stamp
//!      → plan + publish zones → RunState (atomic write)
//! ```
//!
//! Fatal errors (lock, config inputs, reference object, run state) abort
//! before any probing; everything after that degrades per edge or per zone.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;

use tracing::Instrument;
use uuid::Uuid;

use crate::config::inputs::{read_edge_list, zone_mtimes};
use crate::config::EdgeConfig;
use crate::error::{CycleError, StoreError};
use crate::health::record::RecordOptions;
use crate::health::tier::Tally;
use crate::health::timestamp::Timestamp;
use crate::lifecycle::lock::CycleLock;
use crate::lifecycle::publish::{LogPublisher, ManifestPublisher, ZoneManifest, ZonePublisher};
use crate::observability::metrics;
use crate::orchestrator::{OrchestratorSettings, ProbeOrchestrator};
use crate::probe::checksum::reference_checksum;
use crate::probe::edge::{HttpProbe, Prober};
use crate::selection::{plan_zone_writes, LiveSetSelector};
use crate::store::records::load_records;
use crate::store::run_state::RunState;

/// Command-line switches that change how a cycle behaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleOptions {
    /// Probe and decide, but write no records, state or zones.
    pub dry_run: bool,
    /// Rewrite every zone even if nothing changed.
    pub force_update: bool,
}

/// Summary of a completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub run_id: Uuid,
    pub dnet: String,
    pub live: Vec<String>,
    /// Zone → canary edge in use.
    pub canaries: BTreeMap<String, String>,
    pub changed: bool,
    pub complete: bool,
    pub canary_changes: Vec<String>,
    pub zones_written: Vec<String>,
    pub zones_failed: Vec<String>,
    pub verification_failures: Vec<String>,
    pub canary_killed: bool,
    pub main_tally: Tally,
    pub canary_tally: Tally,
    /// Edges whose record could not be loaded.
    pub skipped_edges: Vec<String>,
}

/// Run one cycle against the real edges.
pub async fn run_cycle(
    config: &EdgeConfig,
    dnet: &str,
    options: CycleOptions,
) -> Result<CycleReport, CycleError> {
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("cycle", dnet = %dnet, run_id = %run_id);

    async move {
        let _lock = CycleLock::acquire(&config.paths.lockfile)?;

        let local_object = &config.probe.local_object;
        let checksum = reference_checksum(local_object).map_err(|source| CycleError::Reference {
            path: local_object.clone(),
            source,
        })?;
        let prober = HttpProbe::new(&config.probe, checksum)?;

        if options.dry_run {
            run_cycle_with(config, dnet, options, prober, &LogPublisher, run_id).await
        } else {
            let publisher = ManifestPublisher::new(&config.paths.output_dir);
            run_cycle_with(config, dnet, options, prober, &publisher, run_id).await
        }
    }
    .instrument(span)
    .await
}

/// Run one cycle with the given prober and publisher. The caller holds the lock.
pub async fn run_cycle_with<P: Prober>(
    config: &EdgeConfig,
    dnet: &str,
    options: CycleOptions,
    prober: P,
    publisher: &dyn ZonePublisher,
    run_id: Uuid,
) -> Result<CycleReport, CycleError> {
    let paths = &config.paths;
    tracing::info!(dry_run = options.dry_run, force_update = options.force_update, "Starting cycle");

    let edges = read_edge_list(&paths.edgelist_dir, dnet).map_err(|source| CycleError::EdgeList {
        dnet: dnet.to_string(),
        source,
    })?;
    let canary_map = config.canaries_for(dnet);
    let canary_edges: BTreeSet<String> = canary_map.values().cloned().collect();
    let current_mtimes = zone_mtimes(&paths.zonetemplate_dir, dnet).map_err(CycleError::Zones)?;

    let state_path = RunState::path_for(&paths.state_dir, dnet);
    let prior = RunState::load(&state_path).map_err(CycleError::State)?;

    if !options.dry_run {
        for dir in [&paths.healthdata_store, &paths.state_dir, &paths.output_dir] {
            fs::create_dir_all(dir).map_err(|e| CycleError::State(StoreError::io(dir, e)))?;
        }
    }

    let mut seen = HashSet::new();
    let tracked: Vec<String> = edges
        .iter()
        .chain(canary_edges.iter())
        .filter(|edge| seen.insert(edge.as_str()))
        .cloned()
        .collect();
    let record_options = RecordOptions {
        history: config.decision.fetch_history,
        nowrite: options.dry_run,
    };
    let loaded = load_records(&paths.healthdata_store, &tracked, record_options);
    let mut records = loaded.records;

    tracing::info!(
        edges = edges.len(),
        canaries = canary_edges.len(),
        zones = current_mtimes.len(),
        skipped = loaded.failed.len(),
        "Loaded cycle inputs"
    );

    let orchestrator = ProbeOrchestrator::new(prober, OrchestratorSettings::from_config(config));
    let probes = orchestrator.run(&edges, &canary_edges, &mut records).await;

    let now = Timestamp::now();
    let selector = LiveSetSelector::new(config.decision.required_edge_count(dnet), &canary_map);
    let selection = selector.select(&probes.main, &probes.canary, &prior, &records);
    selector.stamp(&selection, &probes.main, &probes.canary, &mut records, now);
    metrics::record_live_set(selection.live.len(), selection.changed);

    let live = selection.live_edges();
    let mut zones_written = Vec::new();
    let mut zones_failed = Vec::new();
    for write in plan_zone_writes(&selection, &current_mtimes, &prior.zone_mtimes, options.force_update) {
        let manifest = ZoneManifest {
            zone: write.zone.clone(),
            dnet: dnet.to_string(),
            edges: live.clone(),
            canary: write.canary.clone(),
            serial: now.as_secs(),
            generated_at: now,
        };
        match publisher.publish(&manifest) {
            Ok(()) => {
                tracing::debug!(zone = %write.zone, reason = %write.reason, "Published zone");
                zones_written.push(write.zone);
            }
            Err(e) => {
                tracing::error!(zone = %write.zone, error = %e, "Failed to publish zone");
                zones_failed.push(write.zone);
            }
        }
    }

    let mut state = prior.clone();
    state.last_live = live.clone();
    if selection.is_complete() {
        state.active_canaries = selection.canaries.clone();
        // A zone that failed to publish is forgotten so the next cycle retries it.
        state.zone_mtimes = current_mtimes
            .iter()
            .filter(|(zone, _)| !zones_failed.contains(*zone))
            .map(|(zone, mtime)| (zone.clone(), *mtime))
            .collect();
    }
    if selection.changed {
        state.add_rotation(now, config.decision.max_rotations);
    }
    state.verification_failures = probes.verification_failures.clone();
    state.set_last_run(now);

    if options.dry_run {
        tracing::info!(path = %state_path.display(), "Dry run, not writing run state");
    } else {
        state.save(&state_path).map_err(CycleError::State)?;
    }

    let report = CycleReport {
        run_id,
        dnet: dnet.to_string(),
        live,
        canaries: selection.canaries.clone(),
        changed: selection.changed,
        complete: selection.is_complete(),
        canary_changes: selection.canary_changes.iter().cloned().collect(),
        zones_written,
        zones_failed,
        verification_failures: probes.verification_failures,
        canary_killed: probes.canary_killed,
        main_tally: probes.main_tally,
        canary_tally: probes.canary_tally,
        skipped_edges: loaded.failed,
    };

    tracing::info!(
        live = ?report.live,
        changed = report.changed,
        zones_written = report.zones_written.len(),
        verification_failures = report.verification_failures.len(),
        "Cycle complete"
    );
    Ok(report)
}
