//! Multi-tier health judgement.
//!
//! # Precedence (first match wins)
//! ```text
//! judge disabled                         → fail (every member)
//! last sample < threshold                → pass_threshold
//! last sample == timeout sentinel        → fail
//! window has samples, window avg < thr   → pass_window
//! retained avg < threshold               → pass_average
//! otherwise                              → pass
//! ```
//!
//! # Design Decisions
//! - Freshest data dominates; a stale good average never hides a server
//!   that just failed, so the timeout check runs before the averages
//! - The judge owns membership and verdicts only; samples stay in the
//!   records, passed in at classification time
//! - `now` is explicit so repeated classification is deterministic

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::health::record::EdgeHealthRecord;
use crate::health::tier::{Tally, Tier};
use crate::health::timestamp::Timestamp;

/// Judges a pool of edges against a latency threshold.
#[derive(Debug, Clone)]
pub struct HealthJudge {
    pool: &'static str,
    window: Duration,
    timeout_sentinel: f64,
    disabled: bool,
    /// Member edges and their latest verdict (`None` until classified).
    verdicts: BTreeMap<String, Option<Tier>>,
}

impl HealthJudge {
    /// A judge for `pool` (used in logs) with the given short window and
    /// the latency value that marks a timed-out probe.
    pub fn new(pool: &'static str, window: Duration, timeout_sentinel: f64) -> Self {
        Self {
            pool,
            window,
            timeout_sentinel,
            disabled: false,
            verdicts: BTreeMap::new(),
        }
    }

    pub fn pool(&self) -> &'static str {
        self.pool
    }

    /// Add an edge to the judged set. Re-admitting a member is a no-op.
    pub fn admit(&mut self, edge: &str) {
        self.verdicts.entry(edge.to_string()).or_insert(None);
    }

    pub fn contains(&self, edge: &str) -> bool {
        self.verdicts.contains_key(edge)
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    /// Fail every member on the next classification.
    pub fn disable(&mut self) {
        self.disabled = true;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// The latest verdict for `edge`; `None` if unknown or not yet classified.
    pub fn judgement(&self, edge: &str) -> Option<Tier> {
        self.verdicts.get(edge).copied().flatten()
    }

    /// Every member with its verdict.
    pub fn judgements(&self) -> impl Iterator<Item = (&str, Option<Tier>)> {
        self.verdicts.iter().map(|(edge, tier)| (edge.as_str(), *tier))
    }

    /// Classify every member, store the verdicts and return the tally.
    ///
    /// A member with no record or no samples is judged `fail`.
    pub fn classify(
        &mut self,
        records: &HashMap<String, EdgeHealthRecord>,
        threshold: f64,
        now: Timestamp,
    ) -> Tally {
        let mut tally = Tally::default();

        if self.disabled {
            for verdict in self.verdicts.values_mut() {
                *verdict = Some(Tier::Fail);
                tally.add(Tier::Fail);
            }
            tracing::info!(pool = self.pool, failed = tally.failures(), "Pool disabled, failing every edge");
            return tally;
        }

        for (edge, verdict) in self.verdicts.iter_mut() {
            let tier = match records.get(edge) {
                Some(record) => judge_record(self.pool, record, threshold, self.timeout_sentinel, self.window, now),
                None => {
                    tracing::warn!(pool = self.pool, edge = %edge, "No record for judged edge");
                    Tier::Fail
                }
            };
            *verdict = Some(tier);
            tally.add(tier);
        }

        tracing::debug!(pool = self.pool, tally = %tally, "Classified pool");
        tally
    }
}

fn judge_record(
    pool: &str,
    record: &EdgeHealthRecord,
    threshold: f64,
    timeout_sentinel: f64,
    window: Duration,
    now: Timestamp,
) -> Tier {
    let edge = record.edge();
    let (Some(last), Some(average)) = (record.last_value(), record.current_average()) else {
        tracing::info!(pool, edge = %edge, "FAIL: no samples recorded");
        return Tier::Fail;
    };
    let window_average = record.window_average(now, window);

    tracing::debug!(
        pool,
        edge = %edge,
        last,
        window_average = ?window_average,
        average,
        "Analysing edge"
    );

    if last < threshold {
        tracing::info!(pool, edge = %edge, last, threshold, "PASS: last fetch under threshold");
        Tier::PassThreshold
    } else if last == timeout_sentinel {
        tracing::info!(pool, edge = %edge, timeout = timeout_sentinel, "FAIL: last fetch timed out");
        Tier::Fail
    } else if window_average.is_some_and(|avg| avg < threshold) {
        tracing::info!(
            pool,
            edge = %edge,
            window_average = ?window_average,
            threshold,
            "UNSURE: last fetch over threshold but window average under it"
        );
        Tier::PassWindow
    } else if average < threshold {
        tracing::info!(
            pool,
            edge = %edge,
            average,
            threshold,
            "UNSURE: last fetch over threshold but retained average under it"
        );
        Tier::PassAverage
    } else {
        tracing::info!(pool, edge = %edge, last, "PASS: over threshold but not timed out");
        Tier::Pass
    }
}
