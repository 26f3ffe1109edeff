//! Which zones need their output rewritten this cycle.

use std::collections::BTreeMap;
use std::fmt;

use crate::selection::selector::Selection;

/// Why a zone is being rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteReason {
    Forced,
    LiveSetChanged,
    CanaryChanged,
    /// No remembered mtime for the zone.
    NewZone,
    TemplateChanged,
}

impl fmt::Display for WriteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteReason::Forced => "forced",
            WriteReason::LiveSetChanged => "live_set_changed",
            WriteReason::CanaryChanged => "canary_changed",
            WriteReason::NewZone => "new_zone",
            WriteReason::TemplateChanged => "template_changed",
        })
    }
}

/// One zone to rewrite, with the canary it should carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneWrite {
    pub zone: String,
    pub canary: Option<String>,
    pub reason: WriteReason,
}

/// Plan the zone rewrites for a selection.
///
/// Nothing is written unless the selection is complete. Otherwise a zone is
/// skipped only when nothing forces it, the live set and its canary are
/// unchanged and its template mtime matches the remembered one.
pub fn plan_zone_writes(
    selection: &Selection,
    current_mtimes: &BTreeMap<String, i64>,
    prior_mtimes: &BTreeMap<String, i64>,
    force: bool,
) -> Vec<ZoneWrite> {
    if !selection.is_complete() {
        tracing::error!(
            have = selection.live.len(),
            required = selection.required,
            "Live set incomplete, not writing any zones"
        );
        return Vec::new();
    }

    let mut writes = Vec::new();
    for (zone, mtime) in current_mtimes {
        let previous = prior_mtimes.get(zone).copied().filter(|m| *m != 0);
        let reason = if force {
            WriteReason::Forced
        } else if selection.changed {
            WriteReason::LiveSetChanged
        } else if selection.canary_changed(zone) {
            WriteReason::CanaryChanged
        } else {
            match previous {
                None => WriteReason::NewZone,
                Some(previous) if previous != *mtime => WriteReason::TemplateChanged,
                Some(_) => {
                    tracing::info!(zone = %zone, "Not writing zone, no changes pending");
                    continue;
                }
            }
        };

        tracing::debug!(zone = %zone, reason = %reason, "Zone needs rewriting");
        writes.push(ZoneWrite {
            zone: zone.clone(),
            canary: selection.canaries.get(zone).cloned(),
            reason,
        });
    }
    writes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::selector::Admission;

    fn selection(changed: bool) -> Selection {
        Selection {
            live: BTreeMap::from([("a".to_string(), Admission::CarriedForward)]),
            canaries: BTreeMap::from([("b.org".to_string(), "c1".to_string())]),
            changed,
            required: 1,
            ..Selection::default()
        }
    }

    fn mtimes(entries: &[(&str, i64)]) -> BTreeMap<String, i64> {
        entries.iter().map(|(z, m)| (z.to_string(), *m)).collect()
    }

    #[test]
    fn test_unchanged_zones_skipped() {
        let current = mtimes(&[("a.org", 100), ("b.org", 200)]);
        assert!(plan_zone_writes(&selection(false), &current, &current, false).is_empty());
    }

    #[test]
    fn test_template_and_new_zones_written() {
        let current = mtimes(&[("a.org", 100), ("b.org", 250), ("new.org", 5)]);
        let prior = mtimes(&[("a.org", 100), ("b.org", 200)]);

        let writes = plan_zone_writes(&selection(false), &current, &prior, false);
        let planned: Vec<_> = writes.iter().map(|w| (w.zone.as_str(), w.reason)).collect();
        assert_eq!(
            planned,
            vec![
                ("b.org", WriteReason::TemplateChanged),
                ("new.org", WriteReason::NewZone)
            ]
        );
        assert_eq!(writes[0].canary.as_deref(), Some("c1"));
    }

    #[test]
    fn test_change_or_force_writes_everything() {
        let current = mtimes(&[("a.org", 100), ("b.org", 200)]);
        assert_eq!(plan_zone_writes(&selection(true), &current, &current, false).len(), 2);

        let forced = plan_zone_writes(&selection(false), &current, &current, true);
        assert!(forced.iter().all(|w| w.reason == WriteReason::Forced));
        assert_eq!(forced.len(), 2);
    }

    #[test]
    fn test_canary_change_writes_only_that_zone() {
        let current = mtimes(&[("a.org", 100), ("b.org", 200)]);
        let mut selection = selection(false);
        selection.canary_changes.insert("b.org".to_string());

        let writes = plan_zone_writes(&selection, &current, &current, false);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].reason, WriteReason::CanaryChanged);
    }

    #[test]
    fn test_incomplete_selection_writes_nothing() {
        let current = mtimes(&[("a.org", 100)]);
        let mut selection = selection(true);
        selection.required = 3;
        assert!(plan_zone_writes(&selection, &current, &BTreeMap::new(), true).is_empty());
    }
}
