//! Periodic poll loop.
//!
//! Each cycle polls every due source concurrently, normalizes what came back,
//! reconciles it against the previous snapshot and publishes exactly one new
//! snapshot, whether or not any source answered.

use chrono::Utc;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::health::{HealthTracker, PollQuality, SourceHealth};
use crate::model::SourceId;
use crate::normalize::normalize_batch;
use crate::reconcile::Reconciler;
use crate::snapshot::{CycleOutcome, Snapshot, SourceStatus};
use crate::source::{PollOutcome, SensorSource};
use crate::store::SnapshotStore;
use crate::{Error, Result};

/// Repeated failures of one source are logged at most this often at warn level.
const FAILURE_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Where the poller is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Polling,
    Reconciling,
    Published,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CyclePhase::Idle => write!(f, "idle"),
            CyclePhase::Polling => write!(f, "polling"),
            CyclePhase::Reconciling => write!(f, "reconciling"),
            CyclePhase::Published => write!(f, "published"),
        }
    }
}

/// Rate limiter for per-source failure logs.
struct FailureLog {
    consecutive: u32,
    last_logged: Instant,
}

impl FailureLog {
    fn new() -> Self {
        Self {
            consecutive: 0,
            last_logged: Instant::now(),
        }
    }

    fn failed(&mut self, source: &SourceId, detail: &str) {
        self.consecutive += 1;
        let elapsed = self.last_logged.elapsed();
        if self.consecutive == 1 {
            warn!("Source {} failed: {}", source, detail);
            self.last_logged = Instant::now();
        } else if elapsed >= FAILURE_LOG_INTERVAL {
            warn!(
                "Source {} failed (repeated {} times in {:?}): {}",
                source, self.consecutive, elapsed, detail
            );
            self.last_logged = Instant::now();
        } else {
            debug!("Source {} failed: {}", source, detail);
        }
    }

    fn succeeded(&mut self, source: &SourceId) {
        if self.consecutive > 1 {
            info!(
                "Source {} recovered after {} failed polls",
                source, self.consecutive
            );
        }
        self.consecutive = 0;
    }
}

/// A source plus the poller's bookkeeping for it.
struct SourceSlot {
    source: SensorSource,
    health: HealthTracker,
    /// Set when the backend reported a permanent error; cleared by a re-check.
    excluded: Option<String>,
    /// Cycles skipped since the last poll while unavailable.
    skipped: u32,
    failures: FailureLog,
}

/// What to do with a slot this cycle.
enum Plan {
    Poll,
    Skip,
    Excluded,
}

/// Drives sources on a fixed cadence and publishes into a [`SnapshotStore`].
pub struct Poller {
    config: TelemetryConfig,
    reconciler: Reconciler,
    slots: Vec<SourceSlot>,
    store: Arc<SnapshotStore>,
    phase: CyclePhase,
    recheck: Arc<AtomicBool>,
}

impl Poller {
    /// Creates a poller. Fails if the config is invalid or two sources share an id.
    pub fn new(
        config: TelemetryConfig,
        sources: Vec<SensorSource>,
        store: Arc<SnapshotStore>,
    ) -> Result<Self> {
        config.validate()?;

        let mut seen = HashSet::new();
        for source in &sources {
            if !seen.insert(source.id().clone()) {
                return Err(Error::InvalidConfig(format!(
                    "source '{}' registered twice",
                    source.id()
                )));
            }
        }

        let slots = sources
            .into_iter()
            .map(|source| SourceSlot {
                source,
                health: HealthTracker::new(config.health.clone()),
                excluded: None,
                skipped: 0,
                failures: FailureLog::new(),
            })
            .collect();

        Ok(Self {
            reconciler: Reconciler::from_config(&config),
            config,
            slots,
            store,
            phase: CyclePhase::Idle,
            recheck: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Current health of every source.
    pub fn health(&self) -> BTreeMap<SourceId, SourceHealth> {
        self.slots
            .iter()
            .map(|slot| (slot.source.id().clone(), slot.health.state()))
            .collect()
    }

    /// Asks the next cycle to re-probe excluded sources.
    pub fn request_recheck(&self) {
        self.recheck.store(true, Ordering::SeqCst);
    }

    /// Runs one full cycle and returns the snapshot it published.
    pub async fn run_cycle(&mut self) -> Arc<Snapshot> {
        let timeout = self.config.source_timeout();
        self.phase = CyclePhase::Polling;

        if self.recheck.swap(false, Ordering::SeqCst) {
            self.recheck_excluded(timeout).await;
        }

        let poll_every = self.config.unavailable_poll_every;
        let plans: Vec<Plan> = self
            .slots
            .iter_mut()
            .map(|slot| plan(slot, poll_every))
            .collect();

        let due: Vec<usize> = plans
            .iter()
            .enumerate()
            .filter(|(_, plan)| matches!(plan, Plan::Poll))
            .map(|(index, _)| index)
            .collect();

        let results = join_all(due.iter().map(|&i| self.slots[i].source.poll(timeout))).await;

        let mut statuses = BTreeMap::new();
        let mut inputs = HashMap::new();

        for (slot, plan) in self.slots.iter().zip(&plans) {
            let status = match plan {
                Plan::Poll => continue,
                Plan::Skip => SourceStatus {
                    health: slot.health.state(),
                    outcome: CycleOutcome::Skipped,
                    elapsed_ms: 0,
                    detail: None,
                },
                Plan::Excluded => SourceStatus {
                    health: SourceHealth::Unavailable,
                    outcome: CycleOutcome::Excluded,
                    elapsed_ms: 0,
                    detail: slot.excluded.clone(),
                },
            };
            statuses.insert(slot.source.id().clone(), status);
        }

        let slow = self.config.slow_poll();
        for (index, result) in due.into_iter().zip(results) {
            let slot = &mut self.slots[index];
            let id = slot.source.id().clone();
            let before = slot.health.state();

            let (outcome, detail) = match result.outcome {
                PollOutcome::Success => {
                    let quality = if result.elapsed > slow {
                        debug!("Source {} slow: {:?}", id, result.elapsed);
                        PollQuality::Slow
                    } else {
                        PollQuality::Good
                    };
                    slot.health.record(quality);
                    slot.failures.succeeded(&id);
                    (CycleOutcome::Success, None)
                }
                PollOutcome::Timeout => {
                    let detail = format!("no response within {:?}", timeout);
                    slot.health.record(PollQuality::Failed);
                    slot.failures.failed(&id, &detail);
                    (CycleOutcome::Timeout, Some(detail))
                }
                PollOutcome::Error(e) => {
                    let detail = e.to_string();
                    slot.failures.failed(&id, &detail);
                    if e.is_permanent() {
                        warn!("Excluding source {} until re-check: {}", id, detail);
                        slot.health.mark_unavailable();
                        slot.excluded = Some(detail.clone());
                    } else {
                        slot.health.record(PollQuality::Failed);
                    }
                    (CycleOutcome::Error, Some(detail))
                }
            };

            let after = slot.health.state();
            if after != before {
                if after > before {
                    warn!("Source {} is now {} (was {})", id, after, before);
                } else {
                    info!("Source {} is now {} (was {})", id, after, before);
                }
            }

            if outcome == CycleOutcome::Success {
                inputs.insert(
                    id.clone(),
                    normalize_batch(&result.readings, &id, result.captured_at),
                );
            }

            statuses.insert(
                id,
                SourceStatus {
                    health: after,
                    outcome,
                    elapsed_ms: result.elapsed.as_millis() as u64,
                    detail,
                },
            );
        }

        self.phase = CyclePhase::Reconciling;
        let previous = self.store.current();
        let snapshot = Arc::new(
            self.reconciler
                .reconcile(&inputs, &previous, statuses, Utc::now()),
        );

        if let Err(e) = self.store.publish(Arc::clone(&snapshot)) {
            warn!("Failed to publish snapshot: {}", e);
        } else {
            debug!(
                "Cycle {} published {} sensor(s), {} stale",
                snapshot.sequence,
                snapshot.len(),
                snapshot.stale_count()
            );
        }
        self.phase = CyclePhase::Published;
        snapshot
    }

    /// Re-probes excluded sources; those that pass rejoin with fresh health.
    async fn recheck_excluded(&mut self, timeout: Duration) {
        let excluded: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.excluded.is_some())
            .map(|(index, _)| index)
            .collect();
        if excluded.is_empty() {
            return;
        }

        let probes = join_all(excluded.iter().map(|&i| self.slots[i].source.probe(timeout))).await;
        for (index, probe) in excluded.into_iter().zip(probes) {
            let slot = &mut self.slots[index];
            match probe {
                Ok(()) => {
                    info!("Source {} passed re-check, resuming polls", slot.source.id());
                    slot.excluded = None;
                    slot.skipped = 0;
                    slot.health.reset();
                }
                Err(e) => {
                    info!("Source {} still excluded: {}", slot.source.id(), e);
                    slot.excluded = Some(e.to_string());
                }
            }
        }
    }

    /// Moves the poller onto its own task and starts the loop.
    ///
    /// Dropping the returned handle without calling [`PollerHandle::shutdown`]
    /// also stops the loop.
    pub fn spawn(self) -> PollerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let recheck = Arc::clone(&self.recheck);
        let task = tokio::spawn(self.run(shutdown_rx));
        PollerHandle {
            shutdown: shutdown_tx,
            recheck,
            task,
        }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let grace = self.config.source_timeout();

        info!(
            "Poller started: {} source(s), every {:?}",
            self.slots.len(),
            self.config.poll_interval()
        );

        loop {
            self.phase = CyclePhase::Idle;
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            let cycle = self.run_cycle();
            tokio::pin!(cycle);
            tokio::select! {
                _ = &mut cycle => {}
                _ = shutdown.changed() => {
                    if tokio::time::timeout(grace, &mut cycle).await.is_err() {
                        warn!("Abandoning in-flight poll cycle after {:?}", grace);
                    }
                    break;
                }
            }
        }

        info!("Poller stopped");
    }
}

/// Control handle for a spawned [`Poller`].
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    recheck: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Signals the loop to stop after the in-flight cycle, if any.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Asks the next cycle to re-probe excluded sources.
    pub fn recheck(&self) {
        self.recheck.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the loop to exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!("Poller task failed: {}", e);
        }
    }
}

/// Decides whether `slot` is polled this cycle, advancing its backoff counter.
fn plan(slot: &mut SourceSlot, poll_every: u32) -> Plan {
    if slot.excluded.is_some() {
        return Plan::Excluded;
    }
    if slot.health.state() != SourceHealth::Unavailable {
        slot.skipped = 0;
        return Plan::Poll;
    }
    slot.skipped += 1;
    if slot.skipped >= poll_every {
        slot.skipped = 0;
        Plan::Poll
    } else {
        Plan::Skip
    }
}
