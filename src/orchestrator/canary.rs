//! Canary kill-switch.
//!
//! When too many canaries fail in one cycle, every canary is failed for the
//! cycle: the canary judge is disabled, probes that have not started yet are
//! cancelled, and canaries without a result get a synthesized timeout so each
//! one still ends the cycle with a verdict.

use std::collections::{BTreeSet, HashMap};

use tokio_util::sync::CancellationToken;

use crate::health::judge::HealthJudge;
use crate::health::record::EdgeHealthRecord;
use crate::health::tier::Mode;
use crate::health::timestamp::Timestamp;
use crate::observability;

/// Trips once per cycle when canary failures reach the configured limit.
#[derive(Debug)]
pub struct CanaryKillSwitch {
    limit: Option<usize>,
    token: CancellationToken,
    tripped: bool,
}

impl CanaryKillSwitch {
    /// A switch that trips at `limit` failed canaries; `None` never trips.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            token: CancellationToken::new(),
            tripped: false,
        }
    }

    /// Token handed to canary probe tasks; cancelled when the switch trips.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Re-judge the canaries and trip if failures reach the limit.
    ///
    /// Returns the canaries that received a synthesized timeout, or `None` if
    /// the switch did not trip on this call.
    pub fn evaluate(
        &mut self,
        judge: &mut HealthJudge,
        records: &mut HashMap<String, EdgeHealthRecord>,
        canaries: &BTreeSet<String>,
        threshold: f64,
        timeout_secs: f64,
        now: Timestamp,
    ) -> Option<Vec<String>> {
        let limit = self.limit?;
        if self.tripped || canaries.is_empty() || judge.is_disabled() {
            return None;
        }

        let tally = judge.classify(records, threshold, now);
        if tally.failures() < limit {
            return None;
        }

        self.tripped = true;
        judge.disable();
        self.token.cancel();
        tracing::warn!(
            failed = tally.failures(),
            limit,
            "Hit canary kill limit, disabling canaries and cancelling queued canary probes"
        );
        observability::metrics::record_canary_killed();

        let mut synthesized = Vec::new();
        for edge in canaries {
            if judge.contains(edge) {
                continue;
            }
            let Some(record) = records.get_mut(edge) else {
                tracing::error!(edge = %edge, "No record for untested canary, skipping");
                continue;
            };
            if record.mode() == Mode::Unavailable {
                continue;
            }
            if let Err(e) = record.add_value_at(timeout_secs, now) {
                tracing::error!(edge = %edge, error = %e, "Failed to persist synthesized timeout");
            }
            judge.admit(edge);
            synthesized.push(edge.clone());
        }
        tracing::info!(count = synthesized.len(), "Marked untested canaries as timed out");
        Some(synthesized)
    }
}
