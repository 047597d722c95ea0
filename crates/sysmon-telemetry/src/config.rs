//! Telemetry configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::model::SourceId;
use crate::{Error, Result};

/// Configuration supplied to the poller at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Poll cycle interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Per-source timeout for one poll in milliseconds
    #[serde(default = "default_source_timeout")]
    pub source_timeout_ms: u64,

    /// Consecutive missed cycles after which a carried-forward sensor is dropped
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold: u32,

    /// Number of recent snapshots retained for trend queries
    #[serde(default = "default_history_len")]
    pub history_len: usize,

    /// Source ids, highest precedence first
    #[serde(default = "default_precedence")]
    pub precedence: Vec<String>,

    /// Poll an unavailable source only every N cycles
    #[serde(default = "default_unavailable_poll_every")]
    pub unavailable_poll_every: u32,

    /// Source health thresholds
    #[serde(default)]
    pub health: HealthConfig,
}

/// Thresholds driving source health transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Consecutive failed or slow polls before a source is degraded
    #[serde(default = "default_degraded_after")]
    pub degraded_after: u32,

    /// Consecutive failed polls before a source is unavailable
    #[serde(default = "default_unavailable_after")]
    pub unavailable_after: u32,

    /// Consecutive good polls before a source is healthy again
    #[serde(default = "default_recover_after")]
    pub recover_after: u32,

    /// Successful polls slower than this (milliseconds) count as slow
    #[serde(default = "default_slow_poll")]
    pub slow_poll_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_after: default_degraded_after(),
            unavailable_after: default_unavailable_after(),
            recover_after: default_recover_after(),
            slow_poll_ms: default_slow_poll(),
        }
    }
}

// Default value functions
fn default_poll_interval() -> u64 {
    1000
}

fn default_source_timeout() -> u64 {
    800
}

fn default_stale_threshold() -> u32 {
    3
}

fn default_history_len() -> usize {
    60
}

fn default_precedence() -> Vec<String> {
    vec!["hwmon".to_string(), "sysinfo".to_string()]
}

fn default_unavailable_poll_every() -> u32 {
    10
}

fn default_degraded_after() -> u32 {
    2
}

fn default_unavailable_after() -> u32 {
    5
}

fn default_recover_after() -> u32 {
    2
}

fn default_slow_poll() -> u64 {
    500
}

impl TelemetryConfig {
    /// Checks every field, failing on the first contract violation.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.source_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "source_timeout_ms must be positive".to_string(),
            ));
        }
        if self.stale_threshold == 0 {
            return Err(Error::InvalidConfig(
                "stale_threshold must be at least 1".to_string(),
            ));
        }
        if self.history_len == 0 {
            return Err(Error::InvalidConfig(
                "history_len must be at least 1".to_string(),
            ));
        }
        if self.unavailable_poll_every == 0 {
            return Err(Error::InvalidConfig(
                "unavailable_poll_every must be at least 1".to_string(),
            ));
        }

        let health = &self.health;
        for (name, value) in [
            ("health.degraded_after", health.degraded_after),
            ("health.unavailable_after", health.unavailable_after),
            ("health.recover_after", health.recover_after),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{} must be at least 1", name)));
            }
        }

        let mut seen = HashSet::new();
        for name in &self.precedence {
            if name.trim().is_empty() {
                return Err(Error::InvalidConfig(
                    "precedence entries must not be empty".to_string(),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "source '{}' listed twice in precedence",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Poll cycle interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-source timeout.
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    /// Slow-poll threshold.
    pub fn slow_poll(&self) -> Duration {
        Duration::from_millis(self.health.slow_poll_ms)
    }

    /// Precedence order as source ids.
    pub fn precedence_ids(&self) -> Vec<SourceId> {
        self.precedence.iter().map(|s| SourceId::new(s.as_str())).collect()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            source_timeout_ms: default_source_timeout(),
            stale_threshold: default_stale_threshold(),
            history_len: default_history_len(),
            precedence: default_precedence(),
            unavailable_poll_every: default_unavailable_poll_every(),
            health: HealthConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TelemetryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.stale_threshold, 3);
        assert_eq!(config.unavailable_poll_every, 10);
        assert_eq!(
            config.precedence_ids(),
            vec![SourceId::new("hwmon"), SourceId::new("sysinfo")]
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = TelemetryConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_thresholds_rejected() {
        let config = TelemetryConfig {
            stale_threshold: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = TelemetryConfig::default();
        config.health.recover_after = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("health.recover_after"));
    }

    #[test]
    fn test_duplicate_precedence_rejected() {
        let config = TelemetryConfig {
            precedence: vec!["hwmon".into(), "sysinfo".into(), "hwmon".into()],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("hwmon"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TelemetryConfig = toml::from_str(
            r#"
            poll_interval_ms = 250
            precedence = ["sysinfo"]

            [health]
            slow_poll_ms = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.source_timeout_ms, 800);
        assert_eq!(config.precedence, vec!["sysinfo".to_string()]);
        assert_eq!(config.health.slow_poll_ms, 100);
        assert_eq!(config.health.unavailable_after, 5);
    }
}
