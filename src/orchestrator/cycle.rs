//! Concurrent probing of one dnet's edges.
//!
//! Every edge (main and canary) gets its own task, gated by a semaphore of
//! `workers` permits. Results are consumed in completion order on a single
//! loop, which is the only writer to records and judges.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::EdgeConfig;
use crate::health::judge::HealthJudge;
use crate::health::record::EdgeHealthRecord;
use crate::health::tier::{Mode, Tally};
use crate::health::timestamp::Timestamp;
use crate::observability::metrics;
use crate::orchestrator::canary::CanaryKillSwitch;
use crate::probe::edge::Prober;
use crate::probe::outcome::ProbeOutcome;

/// The knobs the orchestrator needs from the configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub workers: usize,
    /// Good-enough latency threshold in seconds.
    pub threshold: f64,
    pub canary_killer: Option<usize>,
    /// Sample recorded for a timed-out or failed probe.
    pub timeout_secs: f64,
    pub window: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &EdgeConfig) -> Self {
        Self {
            workers: config.probe.workers,
            threshold: config.decision.good_enough,
            canary_killer: config.decision.canary_killer,
            timeout_secs: config.probe.fetch_timeout_secs,
            window: config.decision.window(),
        }
    }
}

/// What one round of probing produced.
#[derive(Debug)]
pub struct CycleProbes {
    pub main: HealthJudge,
    pub canary: HealthJudge,
    pub main_tally: Tally,
    pub canary_tally: Tally,
    /// Edges that answered with the wrong content, in completion order.
    pub verification_failures: Vec<String>,
    pub canary_killed: bool,
    /// Canary probes cancelled before they started.
    pub cancelled: Vec<String>,
}

enum TaskResult {
    Probed { edge: String, outcome: ProbeOutcome },
    Cancelled { edge: String },
}

/// Drives the prober across a dnet and feeds the results into records and
/// the two judges.
pub struct ProbeOrchestrator<P: Prober> {
    prober: Arc<P>,
    settings: OrchestratorSettings,
}

impl<P: Prober> ProbeOrchestrator<P> {
    pub fn new(prober: P, settings: OrchestratorSettings) -> Self {
        Self {
            prober: Arc::new(prober),
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Probe `edges` plus every canary edge, once each.
    ///
    /// Edges without an entry in `records` are probed but their results are
    /// dropped with an error log.
    pub async fn run(
        &self,
        edges: &[String],
        canaries: &BTreeSet<String>,
        records: &mut HashMap<String, EdgeHealthRecord>,
    ) -> CycleProbes {
        let settings = &self.settings;
        let mut main = HealthJudge::new("main", settings.window, settings.timeout_secs);
        let mut canary = HealthJudge::new("canary", settings.window, settings.timeout_secs);
        let mut switch = CanaryKillSwitch::new(settings.canary_killer);
        let mut verification_failures = Vec::new();
        let mut cancelled = Vec::new();

        let targets = probe_targets(edges, canaries);
        tracing::info!(
            edges = targets.len(),
            canaries = canaries.len(),
            workers = settings.workers,
            "Starting probes"
        );

        let mut tasks = self.spawn_probes(&targets, canaries, switch.token());

        while let Some(joined) = tasks.join_next().await {
            let (edge, outcome) = match joined {
                Ok(TaskResult::Probed { edge, outcome }) => (edge, outcome),
                Ok(TaskResult::Cancelled { edge }) => {
                    tracing::debug!(edge = %edge, "Canary probe cancelled before start");
                    cancelled.push(edge);
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Probe task failed");
                    continue;
                }
            };

            metrics::record_probe(&outcome);
            if outcome.is_verify_failure() {
                verification_failures.push(edge.clone());
            }

            let Some(record) = records.get_mut(&edge) else {
                tracing::error!(edge = %edge, "No usable record for edge, skipping result");
                continue;
            };

            let now = Timestamp::now();
            let sample = outcome.sample(settings.timeout_secs);
            tracing::debug!(edge = %edge, outcome = outcome.label(), sample, "Probe finished");
            if let Err(e) = record.add_value_at(sample, now) {
                tracing::error!(edge = %edge, error = %e, "Failed to persist probe sample");
            }

            if record.mode() == Mode::Unavailable {
                tracing::info!(edge = %edge, "Edge is unavailable, not judging");
                continue;
            }

            if canaries.contains(&edge) {
                canary.admit(&edge);
                switch.evaluate(
                    &mut canary,
                    records,
                    canaries,
                    settings.threshold,
                    settings.timeout_secs,
                    now,
                );
            } else {
                main.admit(&edge);
            }
        }

        let now = Timestamp::now();
        let main_tally = main.classify(records, settings.threshold, now);
        let canary_tally = canary.classify(records, settings.threshold, now);
        metrics::record_judgements("main", &main_tally);
        metrics::record_judgements("canary", &canary_tally);
        metrics::record_verification_failures(verification_failures.len());

        tracing::info!(
            main = %main_tally,
            canary = %canary_tally,
            verification_failures = verification_failures.len(),
            canary_killed = switch.is_tripped(),
            "Probing complete"
        );

        CycleProbes {
            main,
            canary,
            main_tally,
            canary_tally,
            verification_failures,
            canary_killed: switch.is_tripped(),
            cancelled,
        }
    }

    fn spawn_probes(
        &self,
        targets: &[String],
        canaries: &BTreeSet<String>,
        token: CancellationToken,
    ) -> JoinSet<TaskResult> {
        let permits = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let mut tasks = JoinSet::new();

        for edge in targets {
            let edge = edge.clone();
            let prober = Arc::clone(&self.prober);
            let permits = Arc::clone(&permits);
            let cancel = canaries.contains(&edge).then(|| token.clone());

            tasks.spawn(async move {
                let permit = match &cancel {
                    Some(token) => tokio::select! {
                        biased;
                        _ = token.cancelled() => return TaskResult::Cancelled { edge },
                        permit = permits.acquire_owned() => permit,
                    },
                    None => permits.acquire_owned().await,
                };
                let Ok(_permit) = permit else {
                    return TaskResult::Cancelled { edge };
                };
                if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                    return TaskResult::Cancelled { edge };
                }

                let outcome = prober.probe(&edge).await;
                TaskResult::Probed { edge, outcome }
            });
        }
        tasks
    }
}

/// Main edges in list order followed by canaries not already listed.
fn probe_targets(edges: &[String], canaries: &BTreeSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    edges
        .iter()
        .chain(canaries.iter())
        .filter(|edge| seen.insert(edge.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::tier::Tier;
    use std::future::Future;
    use std::sync::Mutex;

    const TIMEOUT: f64 = 10.0;

    /// Answers each edge with a fixed outcome after a fixed delay.
    struct Scripted {
        script: HashMap<String, (u64, ProbeOutcome)>,
        started: Arc<Mutex<Vec<String>>>,
    }

    impl Scripted {
        fn new(script: &[(&str, u64, ProbeOutcome)]) -> Self {
            Self {
                script: script
                    .iter()
                    .map(|(edge, delay, outcome)| (edge.to_string(), (*delay, outcome.clone())))
                    .collect(),
                started: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl Prober for Scripted {
        fn probe(&self, edge: &str) -> impl Future<Output = ProbeOutcome> + Send {
            self.started.lock().unwrap().push(edge.to_string());
            let (delay, outcome) = self
                .script
                .get(edge)
                .cloned()
                .unwrap_or((0, ProbeOutcome::TimedOut));
            async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                outcome
            }
        }
    }

    fn settings(workers: usize, canary_killer: Option<usize>) -> OrchestratorSettings {
        OrchestratorSettings {
            workers,
            threshold: 1.0,
            canary_killer,
            timeout_secs: TIMEOUT,
            window: Duration::from_secs(300),
        }
    }

    fn records(edges: &[&str]) -> HashMap<String, EdgeHealthRecord> {
        edges
            .iter()
            .map(|edge| (edge.to_string(), EdgeHealthRecord::detached(edge, 100)))
            .collect()
    }

    fn names(edges: &[&str]) -> Vec<String> {
        edges.iter().map(|e| e.to_string()).collect()
    }

    fn verify_failure(edge: &str) -> ProbeOutcome {
        ProbeOutcome::Failed(crate::probe::outcome::ProbeFailure {
            kind: crate::probe::outcome::FailKind::VerifyFailed,
            edge: edge.to_string(),
            reason: "deadbeef".into(),
        })
    }

    #[tokio::test]
    async fn test_results_consumed_in_completion_order() {
        let prober = Scripted::new(&[
            ("slow", 300, ProbeOutcome::Latency(0.3)),
            ("fast", 10, ProbeOutcome::Latency(0.01)),
            ("medium", 100, ProbeOutcome::Latency(0.1)),
        ]);
        let orchestrator = ProbeOrchestrator::new(prober, settings(3, None));
        let mut records = records(&["slow", "fast", "medium"]);

        let probes = orchestrator
            .run(&names(&["slow", "fast", "medium"]), &BTreeSet::new(), &mut records)
            .await;

        let stamp = |edge: &str| *records[edge].fetch_times().keys().next().unwrap();
        assert!(stamp("fast") < stamp("medium"));
        assert!(stamp("medium") < stamp("slow"));
        assert_eq!(probes.main.len(), 3);
        assert_eq!(probes.main_tally.get(Tier::PassThreshold), 3);
    }

    #[tokio::test]
    async fn test_unavailable_recorded_but_not_judged() {
        let prober = Scripted::new(&[
            ("up", 0, ProbeOutcome::Latency(0.2)),
            ("maint", 0, ProbeOutcome::Latency(0.2)),
        ]);
        let orchestrator = ProbeOrchestrator::new(prober, settings(2, None));
        let mut records = records(&["up", "maint"]);
        records.get_mut("maint").unwrap().set_mode(Mode::Unavailable).unwrap();

        let probes = orchestrator
            .run(&names(&["up", "maint"]), &BTreeSet::new(), &mut records)
            .await;

        assert_eq!(records["maint"].len(), 1);
        assert!(!probes.main.contains("maint"));
        assert!(!probes.canary.contains("maint"));
        assert!(probes.main.contains("up"));
    }

    #[tokio::test]
    async fn test_verify_failures_surface_and_fail() {
        let prober = Scripted::new(&[
            ("good", 0, ProbeOutcome::Latency(0.2)),
            ("bad", 0, verify_failure("bad")),
        ]);
        let orchestrator = ProbeOrchestrator::new(prober, settings(2, None));
        let mut records = records(&["good", "bad"]);

        let probes = orchestrator
            .run(&names(&["good", "bad"]), &BTreeSet::new(), &mut records)
            .await;

        assert_eq!(probes.verification_failures, vec!["bad"]);
        assert_eq!(records["bad"].last_value(), Some(TIMEOUT));
        assert_eq!(probes.main.judgement("bad"), Some(Tier::Fail));
        assert_eq!(probes.main.judgement("good"), Some(Tier::PassThreshold));
    }

    #[tokio::test]
    async fn test_edge_without_record_is_skipped() {
        let prober = Scripted::new(&[
            ("ok", 0, ProbeOutcome::Latency(0.2)),
            ("corrupt", 0, ProbeOutcome::Latency(0.2)),
        ]);
        let orchestrator = ProbeOrchestrator::new(prober, settings(2, None));
        let mut records = records(&["ok"]);

        let probes = orchestrator
            .run(&names(&["ok", "corrupt"]), &BTreeSet::new(), &mut records)
            .await;

        assert!(!probes.main.contains("corrupt"));
        assert_eq!(probes.main_tally.total(), 1);
    }

    #[tokio::test]
    async fn test_canaries_judged_separately() {
        let prober = Scripted::new(&[
            ("m1", 0, ProbeOutcome::Latency(0.2)),
            ("c1", 0, ProbeOutcome::Latency(1.5)),
        ]);
        let orchestrator = ProbeOrchestrator::new(prober, settings(2, Some(1)));
        let mut records = records(&["m1", "c1"]);
        let canaries = BTreeSet::from(["c1".to_string()]);

        let probes = orchestrator.run(&names(&["m1"]), &canaries, &mut records).await;

        assert!(probes.main.contains("m1"));
        assert!(!probes.main.contains("c1"));
        assert_eq!(probes.canary.judgement("c1"), Some(Tier::Pass));
        assert!(!probes.canary_killed);
    }

    #[tokio::test]
    async fn test_kill_switch_accounts_for_every_canary() {
        let prober = Scripted::new(&[
            ("m1", 0, ProbeOutcome::Latency(0.2)),
            ("c1", 0, ProbeOutcome::TimedOut),
            ("c2", 200, ProbeOutcome::Latency(0.1)),
            ("c3", 200, ProbeOutcome::Latency(0.1)),
            ("c4", 200, ProbeOutcome::Latency(0.1)),
        ]);
        let started = Arc::clone(&prober.started);
        let orchestrator = ProbeOrchestrator::new(prober, settings(1, Some(1)));
        let mut records = records(&["m1", "c1", "c2", "c3", "c4"]);
        let canaries: BTreeSet<String> = ["c1", "c2", "c3", "c4"].iter().map(|c| c.to_string()).collect();

        let probes = orchestrator.run(&names(&["m1"]), &canaries, &mut records).await;

        assert!(probes.canary_killed);
        assert!(probes.canary.is_disabled());
        for canary in &canaries {
            assert_eq!(probes.canary.judgement(canary), Some(Tier::Fail), "{canary}");
            assert!(!records[canary].is_empty(), "{canary} has no sample");
        }
        assert_eq!(probes.canary_tally.failures(), 4);
        assert_eq!(probes.main.judgement("m1"), Some(Tier::PassThreshold));

        let started = started.lock().unwrap();
        let started_canaries = started.iter().filter(|e| canaries.contains(*e)).count();
        assert_eq!(started_canaries + probes.cancelled.len(), canaries.len());
    }

    #[test]
    fn test_probe_targets_dedupes_canaries() {
        let canaries = BTreeSet::from(["b".to_string(), "c".to_string()]);
        assert_eq!(probe_targets(&names(&["a", "b"]), &canaries), vec!["a", "b", "c"]);
    }
}
