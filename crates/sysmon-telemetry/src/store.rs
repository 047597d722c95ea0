//! Latest-snapshot store.
//!
//! One writer (the poller) publishes, any number of readers call
//! [`SnapshotStore::current`]. The current snapshot sits behind an
//! [`ArcSwap`], so readers never take a lock and never see a half-built
//! snapshot. A bounded FIFO keeps recent snapshots for trend queries.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::model::SensorId;
use crate::snapshot::Snapshot;
use crate::{Error, Result};

/// Holds the published snapshot chain.
pub struct SnapshotStore {
    current: ArcSwap<Snapshot>,
    history: Mutex<VecDeque<Arc<Snapshot>>>,
    capacity: usize,
}

impl SnapshotStore {
    /// Creates a store retaining the last `capacity` snapshots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            current: ArcSwap::from_pointee(Snapshot::empty()),
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Returns the latest snapshot. Never blocks.
    ///
    /// Before the first publication this is an empty snapshot with sequence 0.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Publishes a new snapshot. Its sequence must be newer than the current one.
    pub fn publish(&self, snapshot: Arc<Snapshot>) -> Result<()> {
        let current = self.current.load();
        if snapshot.sequence <= current.sequence {
            return Err(Error::OutOfOrder {
                current: current.sequence,
                attempted: snapshot.sequence,
            });
        }
        drop(current);

        self.current.store(Arc::clone(&snapshot));

        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push_back(snapshot);
        while history.len() > self.capacity {
            history.pop_front();
        }
        debug!("Published snapshot {}", history.back().map_or(0, |s| s.sequence));
        Ok(())
    }

    /// Maximum number of retained snapshots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retained snapshots, oldest first.
    pub fn recent(&self) -> Vec<Arc<Snapshot>> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Primary value of `id` across retained snapshots, oldest first.
    ///
    /// Snapshots in which the sensor was absent are skipped; invalid readings
    /// appear as `None`.
    pub fn trend(&self, id: &SensorId) -> Vec<(DateTime<Utc>, Option<f64>)> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|snap| snap.get(id).map(|e| (snap.captured_at, e.value())))
            .collect()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MetricKind, Reading, SourceId};
    use crate::snapshot::SnapshotEntry;
    use chrono::TimeDelta;

    fn snapshot(sequence: u64, temp: Option<f64>) -> Arc<Snapshot> {
        let mut snap = Snapshot::empty();
        snap.sequence = sequence;
        snap.captured_at = DateTime::<Utc>::default() + TimeDelta::seconds(sequence as i64);
        if let Some(value) = temp {
            let id = SensorId::new("pkg0", MetricKind::Temperature);
            snap.entries.insert(
                id.clone(),
                SnapshotEntry {
                    primary: Reading {
                        id,
                        source: SourceId::new("hwmon"),
                        label: "pkg0".to_string(),
                        value: Some(value),
                        capacity: None,
                        captured_at: snap.captured_at,
                    },
                    alternates: Vec::new(),
                    missed_cycles: 0,
                },
            );
        }
        Arc::new(snap)
    }

    #[test]
    fn test_current_before_publish() {
        let store = SnapshotStore::new(4);
        let snap = store.current();
        assert!(snap.is_initial());
        assert!(store.recent().is_empty());
    }

    #[test]
    fn test_publish_replaces_current() {
        let store = SnapshotStore::new(4);
        store.publish(snapshot(1, Some(50.0))).unwrap();
        store.publish(snapshot(2, Some(51.0))).unwrap();
        assert_eq!(store.current().sequence, 2);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let store = SnapshotStore::new(4);
        store.publish(snapshot(2, None)).unwrap();
        let err = store.publish(snapshot(2, None)).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfOrder {
                current: 2,
                attempted: 2
            }
        ));
        assert!(store.publish(snapshot(1, None)).is_err());
        assert_eq!(store.current().sequence, 2);
        assert_eq!(store.recent().len(), 1);
    }

    #[test]
    fn test_history_is_fifo() {
        let store = SnapshotStore::new(3);
        for seq in 1..=5 {
            store.publish(snapshot(seq, None)).unwrap();
        }
        let seqs: Vec<u64> = store.recent().iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }

    #[test]
    fn test_trend_skips_absent() {
        let store = SnapshotStore::new(10);
        store.publish(snapshot(1, Some(50.0))).unwrap();
        store.publish(snapshot(2, None)).unwrap();
        store.publish(snapshot(3, Some(52.0))).unwrap();

        let trend = store.trend(&SensorId::new("pkg0", MetricKind::Temperature));
        let values: Vec<Option<f64>> = trend.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![Some(50.0), Some(52.0)]);
        assert!(trend[0].0 < trend[1].0);
    }

    #[test]
    fn test_readers_never_see_torn_snapshots() {
        let store = Arc::new(SnapshotStore::new(8));
        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for seq in 1..=2000u64 {
                    store.publish(snapshot(seq, Some(seq as f64))).unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let mut last = 0;
                    for _ in 0..5000 {
                        let snap = store.current();
                        assert!(snap.sequence >= last);
                        last = snap.sequence;
                        if let Some(value) = snap.value(MetricKind::Temperature, "pkg0") {
                            // Every field must come from the same cycle.
                            assert_eq!(value, snap.sequence as f64);
                            let entry = snap.get(&SensorId::new("pkg0", MetricKind::Temperature));
                            assert_eq!(entry.unwrap().primary.captured_at, snap.captured_at);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.current().sequence, 2000);
    }
}
