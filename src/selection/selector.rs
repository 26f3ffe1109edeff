//! Live-set selection.
//!
//! Turns this cycle's judgements, the operator modes on each record and the
//! previous run state into the new live set and per-zone canary choice.
//!
//! Order of admission:
//! 1. `force` / `blindforce` overrides on non-canary edges
//! 2. previously live edges still at `pass_threshold` (carry-forward)
//! 3. tier fill, strongest tier first, fastest average first within a tier
//! 4. fallback to the previous live set when the tiers run dry

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::health::judge::HealthJudge;
use crate::health::record::EdgeHealthRecord;
use crate::health::tier::{LiveState, Mode, Tier};
use crate::health::timestamp::Timestamp;
use crate::store::run_state::RunState;

/// Why an edge is in the live set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Live last cycle and still at `pass_threshold`.
    CarriedForward,
    /// Mode `force` and not failing.
    Forced,
    /// Mode `blindforce`.
    Blindforced,
    /// Chosen by the tier fill.
    Filled(Tier),
    /// Re-added from the previous live set because nothing better was found.
    Fallback,
}

impl fmt::Display for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Admission::CarriedForward => f.write_str("carried_forward"),
            Admission::Forced => f.write_str("forced"),
            Admission::Blindforced => f.write_str("blindforced"),
            Admission::Filled(tier) => write!(f, "filled:{tier}"),
            Admission::Fallback => f.write_str("fallback"),
        }
    }
}

/// The outcome of one selection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Live edges and why each was admitted.
    pub live: BTreeMap<String, Admission>,
    /// Zone → canary edge in use this cycle.
    pub canaries: BTreeMap<String, String>,
    /// Zones whose canary was added, removed or swapped.
    pub canary_changes: BTreeSet<String>,
    /// Whether the live set itself changed (canary deltas excluded).
    pub changed: bool,
    /// Live edges required for the dnet.
    pub required: usize,
}

impl Selection {
    /// Whether the live set has exactly the required number of edges.
    pub fn is_complete(&self) -> bool {
        self.live.len() == self.required
    }

    pub fn is_live(&self, edge: &str) -> bool {
        self.live.contains_key(edge)
    }

    pub fn live_edges(&self) -> Vec<String> {
        self.live.keys().cloned().collect()
    }

    pub fn canary_changed(&self, zone: &str) -> bool {
        self.canary_changes.contains(zone)
    }
}

/// Chooses the live set for one dnet.
#[derive(Debug, Clone)]
pub struct LiveSetSelector<'a> {
    required: usize,
    /// Zone → configured canary edge.
    canary_map: &'a BTreeMap<String, String>,
}

impl<'a> LiveSetSelector<'a> {
    pub fn new(required: usize, canary_map: &'a BTreeMap<String, String>) -> Self {
        Self {
            required,
            canary_map,
        }
    }

    fn is_canary(&self, edge: &str) -> bool {
        self.canary_map.values().any(|canary| canary == edge)
    }

    /// Choose the live set and canaries from classified judges.
    pub fn select(
        &self,
        main: &HealthJudge,
        canary: &HealthJudge,
        prior: &RunState,
        records: &HashMap<String, EdgeHealthRecord>,
    ) -> Selection {
        let required = self.required;
        let mut live: BTreeMap<String, Admission> = BTreeMap::new();
        let mut changed: Option<bool> = None;

        let still_healthy = self.still_healthy(main, prior);

        let mut overridden: Vec<&EdgeHealthRecord> = records
            .values()
            .filter(|record| !self.is_canary(record.edge()))
            .filter(|record| matches!(record.mode(), Mode::Force | Mode::Blindforce))
            .collect();
        overridden.sort_by(|a, b| a.edge().cmp(b.edge()));

        for record in overridden {
            let edge = record.edge();
            match record.mode() {
                Mode::Force => {
                    let judgement = main.judgement(edge);
                    if !judgement.is_some_and(Tier::is_passing) {
                        tracing::info!(edge = %edge, tier = ?judgement, "Not forcing failing edge live");
                        continue;
                    }
                    if !still_healthy.iter().any(|healthy| healthy == edge) {
                        tracing::debug!(edge = %edge, "Making edge live because it is in mode force");
                        live.insert(edge.to_string(), Admission::Forced);
                        changed = Some(true);
                    }
                }
                Mode::Blindforce => {
                    tracing::debug!(edge = %edge, "Making edge live because it is in mode blindforce");
                    live.insert(edge.to_string(), Admission::Blindforced);
                    if !prior.last_live.iter().any(|last| last == edge) {
                        changed = Some(true);
                    }
                }
                Mode::Available | Mode::Unavailable => {}
            }
        }

        if !still_healthy.is_empty() {
            tracing::info!(edges = ?still_healthy, "Previously live edges are still passing");
            if changed.is_none() {
                changed = Some(false);
            }
        }

        for edge in &still_healthy {
            if live.len() < required {
                live.entry(edge.clone()).or_insert(Admission::CarriedForward);
            }
        }

        if still_healthy.len() == required {
            tracing::info!("Previous live set is still healthy, not making any changes");
        } else {
            tracing::debug!(
                still_healthy = still_healthy.len(),
                required,
                "Not enough healthy edges from last run, adding more"
            );
            changed = Some(true);
            self.fill_by_tier(main, records, &mut live);

            if live.len() < required {
                tracing::error!(
                    have = live.len(),
                    required,
                    "Tried to add edges from all acceptable tiers but failed"
                );
                tracing::error!("Re-adding the last live edges, even though they are failing");
                for edge in &prior.last_live {
                    if records.contains_key(edge) {
                        live.entry(edge.clone()).or_insert(Admission::Fallback);
                    } else {
                        tracing::warn!(edge = %edge, "Previously live edge has no record this cycle, not re-adding");
                    }
                }
                changed = Some(false);
            }
        }

        let (canaries, canary_changes) = self.select_canaries(canary, prior);

        let selection = Selection {
            live,
            canaries,
            canary_changes,
            changed: changed.unwrap_or(false),
            required,
        };

        if selection.is_complete() {
            tracing::info!(
                count = selection.live.len(),
                edges = ?selection.live_edges(),
                changed = selection.changed,
                "Established live edge set"
            );
        } else {
            tracing::error!(
                count = selection.live.len(),
                edges = ?selection.live_edges(),
                required,
                "Could not establish a full live edge set"
            );
        }
        selection
    }

    /// Previously live edges whose current main judgement is `pass_threshold`.
    fn still_healthy(&self, main: &HealthJudge, prior: &RunState) -> Vec<String> {
        let mut healthy: Vec<String> = Vec::new();
        for edge in &prior.last_live {
            if main.judgement(edge) == Some(Tier::PassThreshold) && !healthy.contains(edge) {
                healthy.push(edge.clone());
            }
        }
        healthy
    }

    fn fill_by_tier(
        &self,
        main: &HealthJudge,
        records: &HashMap<String, EdgeHealthRecord>,
        live: &mut BTreeMap<String, Admission>,
    ) {
        for tier in Tier::FILL_ORDER {
            let needed = self.required.saturating_sub(live.len());
            if needed == 0 {
                break;
            }

            let mut candidates: Vec<(&str, f64)> = main
                .judgements()
                .filter(|(edge, judged)| *judged == Some(tier) && !live.contains_key(*edge))
                .map(|(edge, _)| {
                    let average = records
                        .get(edge)
                        .and_then(EdgeHealthRecord::current_average)
                        .unwrap_or(f64::INFINITY);
                    (edge, average)
                })
                .collect();
            candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
            tracing::debug!(tier = %tier, candidates = ?candidates, "Sorted candidates");

            for (edge, _) in candidates.into_iter().take(needed) {
                live.insert(edge.to_string(), Admission::Filled(tier));
            }

            if live.len() >= self.required {
                tracing::info!(required = self.required, tier = %tier, "Filled live edge requirement");
            }
        }
    }

    /// Per zone: the canary in use (if eligible) and whether it changed.
    fn select_canaries(
        &self,
        canary: &HealthJudge,
        prior: &RunState,
    ) -> (BTreeMap<String, String>, BTreeSet<String>) {
        let mut chosen = BTreeMap::new();
        let mut changes = BTreeSet::new();

        let zones: BTreeSet<&String> = self
            .canary_map
            .keys()
            .chain(prior.active_canaries.keys())
            .collect();

        for zone in zones {
            let previous = prior.active_canaries.get(zone);
            let current = match self.canary_map.get(zone) {
                Some(edge) => match canary.judgement(edge) {
                    Some(tier) if tier.is_canary_eligible() => {
                        tracing::info!(zone = %zone, canary = %edge, "Zone has a usable canary edge");
                        Some(edge)
                    }
                    judged => {
                        tracing::info!(
                            zone = %zone,
                            canary = %edge,
                            tier = ?judged,
                            "Canary edge not eligible, not using it"
                        );
                        None
                    }
                },
                None => None,
            };

            if current != previous {
                tracing::info!(
                    zone = %zone,
                    from = ?previous,
                    to = ?current,
                    "Canary edge for zone changed"
                );
                changes.insert(zone.clone());
            }
            if let Some(edge) = current {
                chosen.insert(zone.clone(), edge.clone());
            }
        }

        (chosen, changes)
    }

    /// Persist the outbound health and state of every loaded record.
    ///
    /// Canaries take their health from the canary judge and are always `out`.
    /// An edge entering the live set gets a rotation entry.
    pub fn stamp(
        &self,
        selection: &Selection,
        main: &HealthJudge,
        canary: &HealthJudge,
        records: &mut HashMap<String, EdgeHealthRecord>,
        now: Timestamp,
    ) {
        for (edge, record) in records.iter_mut() {
            let is_canary = self.is_canary(edge);
            let judge = if is_canary { canary } else { main };

            match judge.judgement(edge) {
                Some(tier) => {
                    if let Err(e) = record.set_health(tier) {
                        tracing::error!(edge = %edge, error = %e, "Failed to persist edge health");
                    }
                }
                None => tracing::debug!(edge = %edge, pool = judge.pool(), "No judgement for edge"),
            }

            let state = if !is_canary && selection.is_live(edge) {
                LiveState::In
            } else {
                LiveState::Out
            };
            let entering = state == LiveState::In && record.state() == LiveState::Out;

            if entering {
                if let Err(e) = record.add_rotation(now) {
                    tracing::error!(edge = %edge, error = %e, "Failed to persist rotation entry");
                }
            }
            tracing::debug!(edge = %edge, state = %state, "Setting edge state");
            if let Err(e) = record.set_state(state) {
                tracing::error!(edge = %edge, error = %e, "Failed to persist edge state");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const TIMEOUT: f64 = 10.0;

    fn now() -> Timestamp {
        Timestamp::from_secs(1_700_000_000)
    }

    struct Fixture {
        records: HashMap<String, EdgeHealthRecord>,
        main: HealthJudge,
        canary: HealthJudge,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                records: HashMap::new(),
                main: HealthJudge::new("main", Duration::from_secs(300), TIMEOUT),
                canary: HealthJudge::new("canary", Duration::from_secs(300), TIMEOUT),
            }
        }

        /// `samples` are (age in seconds, latency).
        fn edge(&mut self, edge: &str, samples: &[(i64, f64)]) -> &mut Self {
            self.add(edge, samples, false)
        }

        fn canary(&mut self, edge: &str, samples: &[(i64, f64)]) -> &mut Self {
            self.add(edge, samples, true)
        }

        fn add(&mut self, edge: &str, samples: &[(i64, f64)], canary: bool) -> &mut Self {
            let mut record = EdgeHealthRecord::detached(edge, 100);
            for (age, value) in samples {
                record
                    .add_value_at(*value, Timestamp::from_secs(now().as_secs() - age))
                    .unwrap();
            }
            self.records.insert(edge.to_string(), record);
            if canary {
                self.canary.admit(edge);
            } else {
                self.main.admit(edge);
            }
            self
        }

        fn mode(&mut self, edge: &str, mode: Mode) -> &mut Self {
            self.records.get_mut(edge).unwrap().set_mode(mode).unwrap();
            self
        }

        fn classify(&mut self) {
            self.main.classify(&self.records, 1.0, now());
            self.canary.classify(&self.records, 1.0, now());
        }

        fn select(&mut self, required: usize, canaries: &BTreeMap<String, String>, prior: &RunState) -> Selection {
            self.classify();
            LiveSetSelector::new(required, canaries).select(&self.main, &self.canary, prior, &self.records)
        }
    }

    fn prior(last_live: &[&str]) -> RunState {
        RunState {
            last_live: last_live.iter().map(|e| e.to_string()).collect(),
            ..RunState::default()
        }
    }

    // pass_threshold: fresh sample under 1.0
    fn threshold(latency: f64) -> Vec<(i64, f64)> {
        vec![(0, latency)]
    }

    // pass_window: old slow history, recent window fast, last over 1.0
    fn window() -> Vec<(i64, f64)> {
        vec![(5000, 4.0), (5001, 4.0), (120, 0.2), (0, 1.2)]
    }

    // pass: slow but answering; average is the latency itself
    fn slow(latency: f64) -> Vec<(i64, f64)> {
        vec![(0, latency)]
    }

    #[test]
    fn test_fill_by_tier_fastest_first() {
        let mut f = Fixture::new();
        f.edge("t1", &threshold(0.3))
            .edge("t2", &threshold(0.5))
            .edge("w1", &window());
        for (i, latency) in [3.0, 2.5, 4.0, 1.5, 5.0].iter().enumerate() {
            f.edge(&format!("p{i}"), &slow(*latency));
        }

        let selection = f.select(4, &BTreeMap::new(), &RunState::default());

        assert!(selection.changed);
        assert!(selection.is_complete());
        assert_eq!(selection.live_edges(), vec!["p3", "t1", "t2", "w1"]);
        assert_eq!(selection.live["t1"], Admission::Filled(Tier::PassThreshold));
        assert_eq!(selection.live["w1"], Admission::Filled(Tier::PassWindow));
        assert_eq!(selection.live["p3"], Admission::Filled(Tier::Pass));
    }

    #[test]
    fn test_stable_when_previous_set_still_healthy() {
        let mut f = Fixture::new();
        for edge in ["a", "b", "c", "d"] {
            f.edge(edge, &threshold(0.4));
        }
        f.edge("faster", &threshold(0.01));

        let selection = f.select(4, &BTreeMap::new(), &prior(&["a", "b", "c", "d"]));

        assert!(!selection.changed);
        assert_eq!(selection.live_edges(), vec!["a", "b", "c", "d"]);
        assert!(selection.live.values().all(|a| *a == Admission::CarriedForward));
    }

    #[test]
    fn test_weaker_tier_drops_previous_edge() {
        let mut f = Fixture::new();
        f.edge("a", &threshold(0.4))
            .edge("b", &window())
            .edge("c", &threshold(0.6));

        let selection = f.select(2, &BTreeMap::new(), &prior(&["a", "b"]));

        assert!(selection.changed);
        assert_eq!(selection.live["a"], Admission::CarriedForward);
        assert_eq!(selection.live["c"], Admission::Filled(Tier::PassThreshold));
        assert!(!selection.is_live("b"));
    }

    #[test]
    fn test_fallback_to_previous_live_set() {
        let mut f = Fixture::new();
        f.edge("a", &[(0, TIMEOUT)])
            .edge("b", &[(0, TIMEOUT)])
            .edge("c", &threshold(0.2));

        let selection = f.select(3, &BTreeMap::new(), &prior(&["a", "b", "gone"]));

        assert!(!selection.changed);
        assert_eq!(selection.live["a"], Admission::Fallback);
        assert_eq!(selection.live["c"], Admission::Filled(Tier::PassThreshold));
        assert!(!selection.is_live("gone"));
        assert!(selection.is_complete());
    }

    #[test]
    fn test_force_and_blindforce() {
        let mut f = Fixture::new();
        f.edge("forced", &slow(2.0))
            .edge("forced_failing", &[(0, TIMEOUT)])
            .edge("blind", &[(0, TIMEOUT)])
            .edge("a", &threshold(0.1))
            .edge("b", &threshold(0.2));
        f.mode("forced", Mode::Force)
            .mode("forced_failing", Mode::Force)
            .mode("blind", Mode::Blindforce);

        let selection = f.select(3, &BTreeMap::new(), &prior(&["blind"]));

        assert_eq!(selection.live["forced"], Admission::Forced);
        assert_eq!(selection.live["blind"], Admission::Blindforced);
        assert!(!selection.is_live("forced_failing"));
        assert_eq!(selection.live["a"], Admission::Filled(Tier::PassThreshold));
        assert_eq!(selection.live.len(), 3);
        assert!(selection.changed);
    }

    #[test]
    fn test_blindforce_already_live_keeps_set_stable() {
        let mut f = Fixture::new();
        f.edge("blind", &[(0, TIMEOUT)]).edge("a", &threshold(0.1));
        f.mode("blind", Mode::Blindforce);

        let selection = f.select(1, &BTreeMap::new(), &prior(&["a", "blind"]));

        // The blindforced edge takes the only slot before carry-forward runs.
        assert!(!selection.changed);
        assert!(selection.is_live("blind"));
        assert!(!selection.is_live("a"));
    }

    #[test]
    fn test_forced_edges_over_count_stop_fill() {
        let mut f = Fixture::new();
        f.edge("f1", &threshold(0.5))
            .edge("f2", &threshold(0.5))
            .edge("other", &threshold(0.1));
        f.mode("f1", Mode::Blindforce).mode("f2", Mode::Blindforce);

        let selection = f.select(1, &BTreeMap::new(), &RunState::default());

        assert!(!selection.is_live("other"));
        assert_eq!(selection.live.len(), 2);
        assert!(!selection.is_complete());
    }

    #[test]
    fn test_canary_selection_and_changes() {
        let mut f = Fixture::new();
        f.edge("a", &threshold(0.1))
            .canary("c-pass", &slow(2.0))
            .canary("c-window", &window())
            .canary("c-thresh", &threshold(0.1))
            .canary("c-fail", &[(0, TIMEOUT)]);

        let canaries = BTreeMap::from([
            ("zone-a.org".to_string(), "c-pass".to_string()),
            ("zone-b.org".to_string(), "c-window".to_string()),
            ("zone-c.org".to_string(), "c-thresh".to_string()),
            ("zone-d.org".to_string(), "c-fail".to_string()),
        ]);
        let mut prior = prior(&["a"]);
        prior.active_canaries = BTreeMap::from([
            ("zone-a.org".to_string(), "c-pass".to_string()),
            ("zone-d.org".to_string(), "c-fail".to_string()),
            ("zone-gone.org".to_string(), "c-old".to_string()),
        ]);

        let selection = f.select(1, &canaries, &prior);

        assert_eq!(selection.canaries.get("zone-a.org").map(String::as_str), Some("c-pass"));
        assert_eq!(selection.canaries.get("zone-b.org").map(String::as_str), Some("c-window"));
        assert!(!selection.canaries.contains_key("zone-c.org"));
        assert!(!selection.canaries.contains_key("zone-d.org"));

        let changed: Vec<_> = selection.canary_changes.iter().map(String::as_str).collect();
        assert_eq!(changed, vec!["zone-b.org", "zone-d.org", "zone-gone.org"]);
        assert!(!selection.is_live("c-thresh"));
        assert!(!selection.changed);
    }

    #[test]
    fn test_stamp_sets_state_health_and_rotation() {
        let mut f = Fixture::new();
        f.edge("a", &threshold(0.1))
            .edge("b", &slow(3.0))
            .canary("c", &slow(2.0));
        let canaries = BTreeMap::from([("zone.org".to_string(), "c".to_string())]);
        let selection = f.select(1, &canaries, &RunState::default());

        let selector = LiveSetSelector::new(1, &canaries);
        selector.stamp(&selection, &f.main, &f.canary, &mut f.records, now());

        let a = &f.records["a"];
        assert_eq!(a.state(), LiveState::In);
        assert_eq!(a.health(), Tier::PassThreshold);
        assert_eq!(a.rotation_history(), &[now()]);

        assert_eq!(f.records["b"].state(), LiveState::Out);
        assert_eq!(f.records["b"].health(), Tier::Pass);

        let c = &f.records["c"];
        assert_eq!(c.state(), LiveState::Out);
        assert_eq!(c.health(), Tier::Pass);
        assert!(c.rotation_history().is_empty());

        // Staying live adds no second rotation entry.
        selector.stamp(&selection, &f.main, &f.canary, &mut f.records, now());
        assert_eq!(f.records["a"].rotation_history().len(), 1);
    }
}
