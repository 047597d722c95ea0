//! Immutable telemetry snapshots.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::health::SourceHealth;
use crate::model::{MetricKind, Reading, SensorId, SourceId};

/// What happened to a source in the cycle that produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Success,
    Timeout,
    Error,
    /// Not polled this cycle because of backoff.
    Skipped,
    /// Excluded until a manual re-check.
    Excluded,
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Success => write!(f, "ok"),
            CycleOutcome::Timeout => write!(f, "timeout"),
            CycleOutcome::Error => write!(f, "error"),
            CycleOutcome::Skipped => write!(f, "skipped"),
            CycleOutcome::Excluded => write!(f, "excluded"),
        }
    }
}

/// Per-source status recorded in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
    pub health: SourceHealth,
    pub outcome: CycleOutcome,
    /// Time the poll took, in milliseconds.
    pub elapsed_ms: u64,
    /// Error text for failed or excluded sources.
    pub detail: Option<String>,
}

impl SourceStatus {
    /// Did the source respond within its timeout this cycle?
    pub fn responded(&self) -> bool {
        self.outcome == CycleOutcome::Success
    }
}

/// One sensor in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    /// Reading from the highest-precedence source.
    pub primary: Reading,
    /// Readings for the same sensor from lower-precedence sources.
    pub alternates: Vec<Reading>,
    /// Consecutive cycles without a fresh report. Zero means fresh.
    pub missed_cycles: u32,
}

impl SnapshotEntry {
    /// Returns true if the primary reading was carried forward.
    pub fn is_stale(&self) -> bool {
        self.missed_cycles > 0
    }

    /// Primary value, if valid.
    pub fn value(&self) -> Option<f64> {
        self.primary.value
    }
}

/// Consistent view of every known sensor after one poll cycle.
///
/// Never mutated once published; the next cycle builds a new one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Publication counter, starting at 1 for the first cycle.
    pub sequence: u64,
    /// Reconciliation time.
    pub captured_at: DateTime<Utc>,
    pub entries: BTreeMap<SensorId, SnapshotEntry>,
    pub sources: BTreeMap<SourceId, SourceStatus>,
}

impl Snapshot {
    /// Snapshot served before the first cycle completes.
    pub fn empty() -> Self {
        Self {
            sequence: 0,
            captured_at: DateTime::<Utc>::default(),
            entries: BTreeMap::new(),
            sources: BTreeMap::new(),
        }
    }

    /// Returns true for the placeholder served before the first cycle.
    pub fn is_initial(&self) -> bool {
        self.sequence == 0
    }

    pub fn get(&self, id: &SensorId) -> Option<&SnapshotEntry> {
        self.entries.get(id)
    }

    /// Valid primary value for `device` of `kind`. `device` must be normalized.
    pub fn value(&self, kind: MetricKind, device: &str) -> Option<f64> {
        self.entries
            .get(&SensorId::new(device, kind))
            .and_then(SnapshotEntry::value)
    }

    /// Entries of one kind, ordered by device.
    pub fn by_kind(&self, kind: MetricKind) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries
            .iter()
            .filter(move |(id, _)| id.kind == kind)
            .map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of carried-forward entries.
    pub fn stale_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_stale()).count()
    }

    /// Worst health across all sources. Healthy when there are none.
    pub fn overall_health(&self) -> SourceHealth {
        self.sources
            .values()
            .map(|s| s.health)
            .max()
            .unwrap_or_default()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}
