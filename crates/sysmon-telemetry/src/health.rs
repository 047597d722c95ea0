//! Per-source health tracking.
//!
//! Health moves on runs of consecutive outcomes, never on a single poll, so a
//! source that hiccups once does not flap between states.

use serde::Serialize;
use std::fmt;

use crate::config::HealthConfig;

/// Rolling classification of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceHealth {
    #[default]
    Healthy,
    /// Slow or intermittently failing.
    Degraded,
    /// Consistently failing or excluded.
    Unavailable,
}

impl fmt::Display for SourceHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceHealth::Healthy => write!(f, "healthy"),
            SourceHealth::Degraded => write!(f, "degraded"),
            SourceHealth::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// How a single poll went, as far as health is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollQuality {
    /// Returned data within the slow threshold.
    Good,
    /// Returned data, but slowly.
    Slow,
    /// Timed out or errored.
    Failed,
}

/// Health state machine for one source.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    config: HealthConfig,
    state: SourceHealth,
    consecutive_good: u32,
    consecutive_bad: u32,
    consecutive_failed: u32,
}

impl HealthTracker {
    /// Creates a tracker starting out healthy.
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            state: SourceHealth::Healthy,
            consecutive_good: 0,
            consecutive_bad: 0,
            consecutive_failed: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> SourceHealth {
        self.state
    }

    /// Consecutive failed polls so far.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failed
    }

    /// Records one poll outcome and returns the resulting state.
    pub fn record(&mut self, quality: PollQuality) -> SourceHealth {
        match quality {
            PollQuality::Good => {
                self.consecutive_good = self.consecutive_good.saturating_add(1);
                self.consecutive_bad = 0;
                self.consecutive_failed = 0;
                self.state = match self.state {
                    SourceHealth::Healthy => SourceHealth::Healthy,
                    _ if self.consecutive_good >= self.config.recover_after => {
                        SourceHealth::Healthy
                    }
                    _ => SourceHealth::Degraded,
                };
            }
            PollQuality::Slow => {
                self.consecutive_good = 0;
                self.consecutive_bad = self.consecutive_bad.saturating_add(1);
                self.consecutive_failed = 0;
                self.state = match self.state {
                    SourceHealth::Unavailable => SourceHealth::Degraded,
                    _ if self.consecutive_bad >= self.config.degraded_after => {
                        SourceHealth::Degraded
                    }
                    state => state,
                };
            }
            PollQuality::Failed => {
                self.consecutive_good = 0;
                self.consecutive_bad = self.consecutive_bad.saturating_add(1);
                self.consecutive_failed = self.consecutive_failed.saturating_add(1);
                if self.consecutive_failed >= self.config.unavailable_after {
                    self.state = SourceHealth::Unavailable;
                } else if self.consecutive_bad >= self.config.degraded_after
                    && self.state == SourceHealth::Healthy
                {
                    self.state = SourceHealth::Degraded;
                }
            }
        }
        self.state
    }

    /// Forces the source unavailable, e.g. when its backend reports it unsupported.
    pub fn mark_unavailable(&mut self) {
        self.consecutive_good = 0;
        self.state = SourceHealth::Unavailable;
    }

    /// Clears all history after a manual re-check.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}
