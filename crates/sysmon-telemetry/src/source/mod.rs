//! Sensor sources.
//!
//! A [`SensorBackend`] wraps one native hardware-access API and reads it
//! synchronously. [`SensorSource`] runs those reads on a blocking worker with
//! a caller-supplied timeout, so a hung driver costs one timeout, not a
//! stalled poll cycle.

mod hwmon;
mod system;

pub use self::hwmon::{gpu_names, HwmonBackend, DEFAULT_HWMON_ROOT};
pub use self::system::SysinfoBackend;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::SourceError;
use crate::model::{MetricKind, RawReading, SourceId};
use crate::normalize::{metric_kind, normalize_device};

/// Trait for all sensor backends.
pub trait SensorBackend: Send + 'static {
    /// Returns the backend's source id.
    fn id(&self) -> SourceId;

    /// Checks that the backend can work on this host.
    fn probe(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Reads every sensor the backend knows about. Blocking.
    fn read(&mut self) -> Result<Vec<RawReading>, SourceError>;
}

/// Numbers repeated devices within one batch, in enumeration order.
///
/// The first `nvme Composite` keeps its name, the next becomes
/// `nvme Composite #2`. Both backends apply this rule, so identical chips
/// still line up across sources.
pub(crate) fn qualify_duplicates(raws: &mut [RawReading]) {
    let mut seen: HashMap<(String, MetricKind, String), u32> = HashMap::new();
    for raw in raws.iter_mut() {
        let kind = metric_kind(&raw.metric);
        let metric = if kind == MetricKind::Other {
            normalize_device(&raw.metric)
        } else {
            String::new()
        };
        let count = seen
            .entry((normalize_device(&raw.device), kind, metric))
            .or_insert(0);
        *count += 1;
        if *count > 1 {
            raw.device = format!("{} #{}", raw.device.trim(), count);
        }
    }
}

/// How a poll ended.
#[derive(Debug)]
pub enum PollOutcome {
    Success,
    /// No result within the timeout, or an earlier worker still holds the backend.
    Timeout,
    Error(SourceError),
}

/// Result of one [`SensorSource::poll`].
#[derive(Debug)]
pub struct PollResult {
    pub readings: Vec<RawReading>,
    pub elapsed: Duration,
    pub captured_at: DateTime<Utc>,
    pub outcome: PollOutcome,
}

impl PollResult {
    fn failed(outcome: PollOutcome, started: Instant) -> Self {
        Self {
            readings: Vec::new(),
            elapsed: started.elapsed(),
            captured_at: Utc::now(),
            outcome,
        }
    }

    /// Returns true if the poll produced data.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PollOutcome::Success)
    }
}

/// A backend plus the worker discipline around it.
///
/// The backend sits behind an async mutex owned by whichever worker is
/// reading it. A worker that outlives its timeout is abandoned with the lock
/// still held; later polls see the lock taken and report a timeout without
/// piling up more workers behind the stuck call.
pub struct SensorSource {
    id: SourceId,
    backend: Arc<Mutex<Box<dyn SensorBackend>>>,
}

impl SensorSource {
    /// Wraps a backend.
    pub fn new<B: SensorBackend>(backend: B) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    /// Wraps an already boxed backend.
    pub fn from_boxed(backend: Box<dyn SensorBackend>) -> Self {
        Self {
            id: backend.id(),
            backend: Arc::new(Mutex::new(backend)),
        }
    }

    pub fn id(&self) -> &SourceId {
        &self.id
    }

    /// Probes the backend on a worker, bounded by `timeout`.
    pub async fn probe(&self, timeout: Duration) -> Result<(), SourceError> {
        let started = Instant::now();
        let result = self.run_on_worker(timeout, |backend| backend.probe()).await;
        match result {
            Some(result) => result,
            None => Err(SourceError::Backend(format!(
                "probe did not finish within {:?}",
                started.elapsed()
            ))),
        }
    }

    /// Reads the backend once, bounded by `timeout`. Never retries.
    pub async fn poll(&self, timeout: Duration) -> PollResult {
        let started = Instant::now();
        match self.run_on_worker(timeout, |backend| backend.read()).await {
            Some(Ok(readings)) => PollResult {
                readings,
                elapsed: started.elapsed(),
                captured_at: Utc::now(),
                outcome: PollOutcome::Success,
            },
            Some(Err(e)) => PollResult::failed(PollOutcome::Error(e), started),
            None => PollResult::failed(PollOutcome::Timeout, started),
        }
    }

    /// Runs `call` against the backend on a blocking worker.
    ///
    /// Returns `None` on timeout or when the backend is still held by an
    /// abandoned worker.
    async fn run_on_worker<T, F>(
        &self,
        timeout: Duration,
        call: F,
    ) -> Option<Result<T, SourceError>>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn SensorBackend) -> Result<T, SourceError> + Send + 'static,
    {
        let Ok(mut backend) = Arc::clone(&self.backend).try_lock_owned() else {
            debug!("Source {} still busy with an abandoned call", self.id);
            return None;
        };

        let worker = tokio::task::spawn_blocking(move || call(&mut **backend));
        match tokio::time::timeout(timeout, worker).await {
            Ok(Ok(result)) => Some(result),
            Ok(Err(e)) => Some(Err(SourceError::WorkerPanicked(e.to_string()))),
            Err(_) => {
                // Dropping the JoinHandle detaches the worker; its result is discarded.
                debug!("Source {} timed out after {:?}", self.id, timeout);
                None
            }
        }
    }
}

impl std::fmt::Debug for SensorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorSource").field("id", &self.id).finish()
    }
}
