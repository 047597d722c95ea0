//! Core telemetry data model.
//!
//! Backends produce [`RawReading`]s in whatever shape their native API hands
//! out. The normalizer turns those into [`Reading`]s keyed by a canonical
//! [`SensorId`], which is what the reconciler and consumers work with.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// Category of a reading. Each kind has one canonical unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Degrees Celsius.
    Temperature,
    /// Revolutions per minute.
    FanSpeed,
    /// Percent, 0-100.
    Utilization,
    /// Bytes in use.
    MemoryUsage,
    /// Bytes in use.
    DiskUsage,
    /// Unmapped metric; unit passed through from the backend.
    Other,
}

impl MetricKind {
    /// All kinds, in display order.
    pub const ALL: [MetricKind; 6] = [
        MetricKind::Temperature,
        MetricKind::FanSpeed,
        MetricKind::Utilization,
        MetricKind::MemoryUsage,
        MetricKind::DiskUsage,
        MetricKind::Other,
    ];

    /// Returns the canonical unit symbol.
    pub fn unit(&self) -> &'static str {
        match self {
            MetricKind::Temperature => "°C",
            MetricKind::FanSpeed => "RPM",
            MetricKind::Utilization => "%",
            MetricKind::MemoryUsage | MetricKind::DiskUsage => "B",
            MetricKind::Other => "",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Temperature => write!(f, "temperature"),
            MetricKind::FanSpeed => write!(f, "fan_speed"),
            MetricKind::Utilization => write!(f, "utilization"),
            MetricKind::MemoryUsage => write!(f, "memory"),
            MetricKind::DiskUsage => write!(f, "disk"),
            MetricKind::Other => write!(f, "other"),
        }
    }
}

/// Name of the backend a reading came from, e.g. `"hwmon"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Creates a source id.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Canonical sensor key shared by every backend.
///
/// Two backends reporting the same physical sensor produce equal ids, which
/// is how the reconciler detects overlap. The reporting backend lives on the
/// [`Reading`] itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SensorId {
    /// Normalized device/component name.
    pub device: String,
    /// Metric kind.
    pub kind: MetricKind,
}

impl SensorId {
    /// Creates an id from an already normalized device name.
    pub fn new(device: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            device: device.into(),
            kind,
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.device)
    }
}

// Serialized as "kind:device" so it can key JSON maps.
impl Serialize for SensorId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Unit a backend reported a value in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawUnit {
    Celsius,
    MilliCelsius,
    Kelvin,
    Fahrenheit,
    Rpm,
    Percent,
    /// 0.0-1.0 ratio.
    Fraction,
    /// 0-255 PWM duty cycle.
    Pwm,
    Bytes,
    Kibibytes,
    Mebibytes,
    /// Whatever the backend uses; passed through untouched.
    Native,
}

/// A value exactly as a backend produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    /// Backend-specific device name, un-normalized.
    pub device: String,
    /// Backend-specific metric string, e.g. `"temp"` or `"fan"`.
    pub metric: String,
    pub value: f64,
    pub unit: RawUnit,
    /// Total capacity for memory/disk readings, same unit as `value`.
    pub capacity: Option<f64>,
    /// Human-readable name; defaults to `device`.
    pub label: Option<String>,
}

impl RawReading {
    /// Creates a raw reading.
    pub fn new(
        device: impl Into<String>,
        metric: impl Into<String>,
        value: f64,
        unit: RawUnit,
    ) -> Self {
        Self {
            device: device.into(),
            metric: metric.into(),
            value,
            unit,
            capacity: None,
            label: None,
        }
    }

    /// Attaches a capacity.
    pub fn with_capacity(mut self, capacity: f64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Attaches a display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A normalized reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub id: SensorId,
    /// Backend that produced the reading.
    pub source: SourceId,
    /// Display name.
    pub label: String,
    /// Value in the kind's canonical unit. `None` means the reading is invalid.
    pub value: Option<f64>,
    /// Total capacity for memory/disk readings, in bytes.
    pub capacity: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

impl Reading {
    /// Returns true if the reading carries a trustworthy value.
    pub fn is_valid(&self) -> bool {
        self.value.is_some()
    }

    /// Returns the value as a percentage of capacity, if both are known.
    pub fn percent_of_capacity(&self) -> Option<f64> {
        match (self.value, self.capacity) {
            (Some(value), Some(capacity)) if capacity > 0.0 => Some(value / capacity * 100.0),
            _ => None,
        }
    }
}
