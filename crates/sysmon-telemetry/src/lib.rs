//! sysmon telemetry core
//!
//! Polls hardware sensor backends on a fixed cadence, normalizes their raw
//! values, reconciles overlapping reports into one consistent snapshot per
//! cycle and publishes it for lock-free reads.

pub mod config;
pub mod error;
pub mod format;
pub mod health;
pub mod inventory;
pub mod model;
pub mod normalize;
pub mod poller;
pub mod reconcile;
pub mod snapshot;
pub mod source;
pub mod store;

pub use config::{HealthConfig, TelemetryConfig};
pub use error::{Error, Result, SourceError};
pub use health::{HealthTracker, PollQuality, SourceHealth};
pub use inventory::HardwareInventory;
pub use model::{MetricKind, RawReading, RawUnit, Reading, SensorId, SourceId};
pub use normalize::{normalize, normalize_batch};
pub use poller::{CyclePhase, Poller, PollerHandle};
pub use reconcile::Reconciler;
pub use snapshot::{CycleOutcome, Snapshot, SnapshotEntry, SourceStatus};
pub use source::{
    HwmonBackend, PollOutcome, PollResult, SensorBackend, SensorSource, SysinfoBackend,
};
pub use store::SnapshotStore;
