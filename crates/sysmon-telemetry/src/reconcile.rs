//! Merges normalized readings from every source into one snapshot.
//!
//! Rules, applied per [`SensorId`]:
//! - a single report is used as-is;
//! - overlapping reports resolve by validity, then configured precedence,
//!   then source id; the losers become alternates;
//! - a sensor missing this cycle is carried forward as stale until it has
//!   missed `stale_threshold` cycles in a row, then dropped.
//!
//! Output depends only on the inputs, never on map iteration order.

use chrono::{DateTime, TimeDelta, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::config::TelemetryConfig;
use crate::model::{Reading, SensorId, SourceId};
use crate::snapshot::{Snapshot, SnapshotEntry, SourceStatus};

/// Reconciliation policy.
#[derive(Debug, Clone)]
pub struct Reconciler {
    precedence: Vec<SourceId>,
    stale_threshold: u32,
}

impl Reconciler {
    /// Creates a reconciler. Sources absent from `precedence` rank after all listed ones.
    pub fn new(precedence: Vec<SourceId>, stale_threshold: u32) -> Self {
        Self {
            precedence,
            stale_threshold: stale_threshold.max(1),
        }
    }

    /// Creates a reconciler from a validated config.
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self::new(config.precedence_ids(), config.stale_threshold)
    }

    /// Position of `source` in the precedence list; lower wins.
    pub fn rank(&self, source: &SourceId) -> usize {
        self.precedence
            .iter()
            .position(|s| s == source)
            .unwrap_or(self.precedence.len())
    }

    fn compare(&self, a: &Reading, b: &Reading) -> Ordering {
        b.is_valid()
            .cmp(&a.is_valid())
            .then_with(|| self.rank(&a.source).cmp(&self.rank(&b.source)))
            .then_with(|| a.source.cmp(&b.source))
    }

    /// Builds the next snapshot from this cycle's readings and the previous snapshot.
    pub fn reconcile(
        &self,
        inputs: &HashMap<SourceId, Vec<Reading>>,
        previous: &Snapshot,
        sources: BTreeMap<SourceId, SourceStatus>,
        now: DateTime<Utc>,
    ) -> Snapshot {
        let mut grouped: BTreeMap<&SensorId, Vec<&Reading>> = BTreeMap::new();
        for readings in inputs.values() {
            for reading in readings {
                grouped.entry(&reading.id).or_default().push(reading);
            }
        }

        let mut entries = BTreeMap::new();
        for (id, mut candidates) in grouped {
            // Stable sort: duplicates from one source keep their report order.
            candidates.sort_by(|a, b| self.compare(a, b));
            let mut candidates = candidates.into_iter().cloned();
            let Some(primary) = candidates.next() else {
                continue;
            };
            entries.insert(
                id.clone(),
                SnapshotEntry {
                    primary,
                    alternates: candidates.collect(),
                    missed_cycles: 0,
                },
            );
        }

        for (id, entry) in &previous.entries {
            if entries.contains_key(id) {
                continue;
            }
            let missed = entry.missed_cycles + 1;
            if missed < self.stale_threshold {
                entries.insert(
                    id.clone(),
                    SnapshotEntry {
                        primary: entry.primary.clone(),
                        alternates: Vec::new(),
                        missed_cycles: missed,
                    },
                );
            }
        }

        let floor = previous.captured_at + TimeDelta::microseconds(1);
        Snapshot {
            sequence: previous.sequence + 1,
            captured_at: now.max(floor),
            entries,
            sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetricKind;

    fn reading(source: &str, device: &str, value: Option<f64>) -> Reading {
        Reading {
            id: SensorId::new(device, MetricKind::Temperature),
            source: SourceId::new(source),
            label: device.to_string(),
            value,
            capacity: None,
            captured_at: DateTime::<Utc>::default(),
        }
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(vec![SourceId::new("a"), SourceId::new("b")], 3)
    }

    fn inputs(pairs: Vec<(&str, Vec<Reading>)>) -> HashMap<SourceId, Vec<Reading>> {
        pairs
            .into_iter()
            .map(|(s, r)| (SourceId::new(s), r))
            .collect()
    }

    fn pkg0() -> SensorId {
        SensorId::new("pkg0", MetricKind::Temperature)
    }

    #[test]
    fn test_single_source_used_as_is() {
        let r = reconciler();
        let snap = r.reconcile(
            &inputs(vec![("b", vec![reading("b", "pkg0", Some(64.5))])]),
            &Snapshot::empty(),
            BTreeMap::new(),
            Utc::now(),
        );
        let entry = snap.get(&pkg0()).unwrap();
        assert_eq!(entry.value(), Some(64.5));
        assert!(entry.alternates.is_empty());
        assert!(!entry.is_stale());
        assert_eq!(snap.sequence, 1);
    }

    #[test]
    fn test_precedence_picks_primary() {
        let r = reconciler();
        let snap = r.reconcile(
            &inputs(vec![
                ("b", vec![reading("b", "pkg0", Some(64.5))]),
                ("a", vec![reading("a", "pkg0", Some(62.0))]),
            ]),
            &Snapshot::empty(),
            BTreeMap::new(),
            Utc::now(),
        );
        let entry = snap.get(&pkg0()).unwrap();
        assert_eq!(entry.primary.source, SourceId::new("a"));
        assert_eq!(entry.value(), Some(62.0));
        assert_eq!(entry.alternates.len(), 1);
        assert_eq!(entry.alternates[0].value, Some(64.5));
    }

    #[test]
    fn test_precedence_independent_of_insertion_order() {
        let r = reconciler();
        let now = Utc::now();
        let mut expected = None;
        for order in [["a", "b", "c"], ["c", "b", "a"], ["b", "c", "a"]] {
            let mut map = HashMap::new();
            for s in order {
                map.insert(
                    SourceId::new(s),
                    vec![reading(s, "pkg0", Some(50.0 + s.len() as f64))],
                );
            }
            let snap = r.reconcile(&map, &Snapshot::empty(), BTreeMap::new(), now);
            let sources: Vec<_> = std::iter::once(&snap.entries[&pkg0()].primary)
                .chain(&snap.entries[&pkg0()].alternates)
                .map(|r| r.source.to_string())
                .collect();
            assert_eq!(sources, vec!["a", "b", "c"]);
            match &expected {
                None => expected = Some(snap),
                Some(first) => assert_eq!(first, &snap),
            }
        }
    }

    #[test]
    fn test_unlisted_sources_rank_last_by_name() {
        let r = reconciler();
        assert_eq!(r.rank(&SourceId::new("a")), 0);
        assert_eq!(r.rank(&SourceId::new("b")), 1);
        assert_eq!(r.rank(&SourceId::new("zzz")), 2);

        let snap = r.reconcile(
            &inputs(vec![
                ("y", vec![reading("y", "pkg0", Some(1.0))]),
                ("x", vec![reading("x", "pkg0", Some(2.0))]),
            ]),
            &Snapshot::empty(),
            BTreeMap::new(),
            Utc::now(),
        );
        assert_eq!(snap.entries[&pkg0()].primary.source, SourceId::new("x"));
    }

    #[test]
    fn test_valid_beats_invalid_higher_precedence() {
        let r = reconciler();
        let snap = r.reconcile(
            &inputs(vec![
                ("a", vec![reading("a", "pkg0", None)]),
                ("b", vec![reading("b", "pkg0", Some(64.5))]),
            ]),
            &Snapshot::empty(),
            BTreeMap::new(),
            Utc::now(),
        );
        let entry = &snap.entries[&pkg0()];
        assert_eq!(entry.primary.source, SourceId::new("b"));
        assert_eq!(entry.alternates[0].value, None);
    }

    #[test]
    fn test_carry_forward_then_drop() {
        let r = reconciler();
        let now = Utc::now();
        let first = r.reconcile(
            &inputs(vec![("a", vec![reading("a", "pkg0", Some(62.0))])]),
            &Snapshot::empty(),
            BTreeMap::new(),
            now,
        );

        let gap1 = r.reconcile(&HashMap::new(), &first, BTreeMap::new(), now);
        let entry = &gap1.entries[&pkg0()];
        assert!(entry.is_stale());
        assert_eq!(entry.missed_cycles, 1);
        assert_eq!(entry.primary, first.entries[&pkg0()].primary);

        let gap2 = r.reconcile(&HashMap::new(), &gap1, BTreeMap::new(), now);
        assert_eq!(gap2.entries[&pkg0()].missed_cycles, 2);

        let gap3 = r.reconcile(&HashMap::new(), &gap2, BTreeMap::new(), now);
        assert!(gap3.get(&pkg0()).is_none());
    }

    #[test]
    fn test_resume_after_gap_is_fresh() {
        let r = reconciler();
        let now = Utc::now();
        let first = r.reconcile(
            &inputs(vec![("a", vec![reading("a", "pkg0", Some(62.0))])]),
            &Snapshot::empty(),
            BTreeMap::new(),
            now,
        );
        let gap = r.reconcile(&HashMap::new(), &first, BTreeMap::new(), now);
        let back = r.reconcile(
            &inputs(vec![("a", vec![reading("a", "pkg0", Some(63.0))])]),
            &gap,
            BTreeMap::new(),
            now,
        );
        let entry = &back.entries[&pkg0()];
        assert!(!entry.is_stale());
        assert_eq!(entry.value(), Some(63.0));
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let r = reconciler();
        let now = Utc::now();
        let first = r.reconcile(&HashMap::new(), &Snapshot::empty(), BTreeMap::new(), now);
        // Wall clock stepping backwards must not reorder snapshots.
        let second = r.reconcile(
            &HashMap::new(),
            &first,
            BTreeMap::new(),
            now - TimeDelta::seconds(5),
        );
        assert!(second.captured_at > first.captured_at);
        assert_eq!(second.sequence, first.sequence + 1);
    }
}
