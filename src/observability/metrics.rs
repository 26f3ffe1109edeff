//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define cycle metrics (probe outcomes, judgements, live set)
//! - Render a Prometheus textfile at the end of a cycle
//!
//! # Metrics
//! - `edgekeeper_probe_total` (counter): probes by outcome
//! - `edgekeeper_probe_latency_seconds` (histogram): verified probe latency
//! - `edgekeeper_judgement` (gauge): edges per pool and tier
//! - `edgekeeper_live_edges` (gauge): size of the chosen live set
//! - `edgekeeper_live_set_changed` (gauge): 1 if the live set changed this cycle
//! - `edgekeeper_canary_killed` (counter): canary kill-switch trips
//! - `edgekeeper_verification_failures` (gauge): edges serving wrong content
//!
//! # Design Decisions
//! - A one-shot process has no scrape endpoint, so the exposition surface is a
//!   node-exporter textfile written atomically
//! - Without an installed recorder every call is a no-op

use std::io;
use std::path::Path;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::health::tier::Tally;
use crate::probe::outcome::ProbeOutcome;
use crate::store::atomic::write_atomic;

/// Install the Prometheus recorder; the handle renders the textfile later.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Render every recorded metric and write it atomically to `path`.
pub fn write_textfile(handle: &PrometheusHandle, path: &Path) -> io::Result<()> {
    write_atomic(path, handle.render().as_bytes())
}

pub fn record_probe(outcome: &ProbeOutcome) {
    metrics::counter!("edgekeeper_probe_total", "outcome" => outcome.label()).increment(1);
    if let ProbeOutcome::Latency(secs) = outcome {
        metrics::histogram!("edgekeeper_probe_latency_seconds").record(*secs);
    }
}

pub fn record_judgements(pool: &'static str, tally: &Tally) {
    for (tier, count) in tally.iter() {
        metrics::gauge!("edgekeeper_judgement", "pool" => pool, "tier" => tier.as_str()).set(count as f64);
    }
}

pub fn record_live_set(size: usize, changed: bool) {
    metrics::gauge!("edgekeeper_live_edges").set(size as f64);
    metrics::gauge!("edgekeeper_live_set_changed").set(if changed { 1.0 } else { 0.0 });
}

pub fn record_canary_killed() {
    metrics::counter!("edgekeeper_canary_killed").increment(1);
}

pub fn record_verification_failures(count: usize) {
    metrics::gauge!("edgekeeper_verification_failures").set(count as f64);
}
