//! Configuration management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use sysmon_telemetry::source::DEFAULT_HWMON_ROOT;
use sysmon_telemetry::TelemetryConfig;
use tracing::info;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Poll loop, reconciliation and health settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Which backends to enable
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Terminal output
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Enable the sysinfo inventory backend
    #[serde(default = "default_true")]
    pub sysinfo: bool,

    /// Enable the hwmon sysfs backend
    #[serde(default = "default_true")]
    pub hwmon: bool,

    /// hwmon sysfs root
    #[serde(default = "default_hwmon_root")]
    pub hwmon_root: String,

    /// Report utilization of every logical core
    #[serde(default)]
    pub per_core: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            sysinfo: default_true(),
            hwmon: default_true(),
            hwmon_root: default_hwmon_root(),
            per_core: false,
        }
    }
}

/// Terminal output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Screen refresh interval in milliseconds
    #[serde(default = "default_refresh")]
    pub refresh_ms: u64,

    /// Show readings from lower-precedence sources
    #[serde(default)]
    pub show_alternates: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_ms: default_refresh(),
            show_alternates: false,
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_hwmon_root() -> String {
    DEFAULT_HWMON_ROOT.to_string()
}

fn default_refresh() -> u64 {
    2000
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        config
            .telemetry
            .validate()
            .context("Invalid [telemetry] section")?;
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let config = Self::load(path)?;
            info!("Loaded configuration from: {}", path.display());
            Ok(config)
        } else {
            info!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}
