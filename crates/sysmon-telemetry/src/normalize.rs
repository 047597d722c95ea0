//! Raw backend values to canonical readings.
//!
//! Everything here is a pure function of its inputs: unit conversion,
//! sentinel detection and device-name normalization.

use chrono::{DateTime, Utc};

use crate::model::{MetricKind, RawReading, RawUnit, Reading, SensorId, SourceId};

/// Anything at or below this is "no data" from the backend (0 K reported as 0, unset registers).
const MIN_VALID_CELSIUS: f64 = 0.0;

/// Anything above this is a bogus register value.
const MAX_VALID_CELSIUS: f64 = 200.0;

/// Faster than any fan on a desktop board.
const MAX_VALID_RPM: f64 = 50_000.0;

/// Utilization up to this much over 100% is rounding noise and clamps to 100.
const UTILIZATION_SLACK: f64 = 1.0;

/// Value backends use for "sensor not present".
const SENTINEL: f64 = -1.0;

/// Maps a backend metric string to a kind. Unknown strings map to [`MetricKind::Other`].
pub fn metric_kind(metric: &str) -> MetricKind {
    match metric.trim().to_lowercase().as_str() {
        "temp" | "temperature" | "thermal" => MetricKind::Temperature,
        "fan" | "fan_speed" | "fanspeed" | "rpm" => MetricKind::FanSpeed,
        "load" | "usage" | "utilization" | "utilisation" | "busy" | "pwm" => {
            MetricKind::Utilization
        }
        "memory" | "mem" | "ram" | "swap" => MetricKind::MemoryUsage,
        "disk" | "storage" | "filesystem" => MetricKind::DiskUsage,
        _ => MetricKind::Other,
    }
}

/// Normalizes a device name so the same physical device keys identically across backends.
///
/// Trims, lower-cases and collapses runs of whitespace, `-` and `_` into one `_`.
pub fn normalize_device(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.trim().chars() {
        if c.is_whitespace() || c == '-' || c == '_' {
            pending_sep = !out.is_empty();
            continue;
        }
        if pending_sep {
            out.push('_');
            pending_sep = false;
        }
        out.extend(c.to_lowercase());
    }
    if out.is_empty() {
        "unknown".to_string()
    } else {
        out
    }
}

/// Converts `value` from `unit` into the matching canonical unit (°C, %, bytes).
fn to_canonical(value: f64, unit: RawUnit) -> f64 {
    match unit {
        RawUnit::MilliCelsius => value / 1000.0,
        RawUnit::Kelvin => value - 273.15,
        RawUnit::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
        RawUnit::Fraction => value * 100.0,
        RawUnit::Pwm => value / 255.0 * 100.0,
        RawUnit::Kibibytes => value * 1024.0,
        RawUnit::Mebibytes => value * 1024.0 * 1024.0,
        RawUnit::Celsius
        | RawUnit::Rpm
        | RawUnit::Percent
        | RawUnit::Bytes
        | RawUnit::Native => value,
    }
}

/// Validates a canonical value for its kind. Returns `None` for sentinels and garbage.
fn validate(kind: MetricKind, raw: f64, value: f64, capacity: Option<f64>) -> Option<f64> {
    if !raw.is_finite() || !value.is_finite() {
        return None;
    }
    match kind {
        MetricKind::Temperature => {
            if raw == SENTINEL || value <= MIN_VALID_CELSIUS || value > MAX_VALID_CELSIUS {
                None
            } else {
                Some(value)
            }
        }
        MetricKind::FanSpeed => {
            if value < 0.0 || value > MAX_VALID_RPM {
                None
            } else {
                Some(value)
            }
        }
        MetricKind::Utilization => {
            if value < 0.0 || value > 100.0 + UTILIZATION_SLACK {
                None
            } else {
                Some(value.min(100.0))
            }
        }
        MetricKind::MemoryUsage | MetricKind::DiskUsage => {
            if value < 0.0 {
                return None;
            }
            match capacity {
                Some(total) if !total.is_finite() || total <= 0.0 || value > total => None,
                _ => Some(value),
            }
        }
        MetricKind::Other => Some(value),
    }
}

/// Normalizes one raw reading from `source`, captured at `captured_at`.
pub fn normalize(raw: &RawReading, source: &SourceId, captured_at: DateTime<Utc>) -> Reading {
    let kind = metric_kind(&raw.metric);
    let mut device = normalize_device(&raw.device);
    if kind == MetricKind::Other {
        device = format!("{}/{}", device, normalize_device(&raw.metric));
    }

    let canonical = to_canonical(raw.value, raw.unit);
    let raw_capacity = raw.capacity.map(|c| to_canonical(c, raw.unit));
    let value = validate(kind, raw.value, canonical, raw_capacity);
    let capacity = raw_capacity.filter(|c| c.is_finite() && *c > 0.0);

    Reading {
        id: SensorId::new(device, kind),
        source: source.clone(),
        label: raw
            .label
            .clone()
            .unwrap_or_else(|| raw.device.trim().to_string()),
        value,
        capacity,
        captured_at,
    }
}

/// Normalizes a whole batch from one source.
pub fn normalize_batch(
    raws: &[RawReading],
    source: &SourceId,
    captured_at: DateTime<Utc>,
) -> Vec<Reading> {
    raws.iter()
        .map(|raw| normalize(raw, source, captured_at))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: RawReading) -> Reading {
        normalize(&raw, &SourceId::new("hwmon"), Utc::now())
    }

    #[test]
    fn test_metric_kind_aliases() {
        assert_eq!(metric_kind("Temp"), MetricKind::Temperature);
        assert_eq!(metric_kind(" temperature "), MetricKind::Temperature);
        assert_eq!(metric_kind("FAN"), MetricKind::FanSpeed);
        assert_eq!(metric_kind("usage"), MetricKind::Utilization);
        assert_eq!(metric_kind("swap"), MetricKind::MemoryUsage);
        assert_eq!(metric_kind("disk"), MetricKind::DiskUsage);
        assert_eq!(metric_kind("voltage"), MetricKind::Other);
    }

    #[test]
    fn test_normalize_device() {
        assert_eq!(normalize_device("  Package id 0 "), "package_id_0");
        assert_eq!(normalize_device("coretemp  Package-id__0"), "coretemp_package_id_0");
        assert_eq!(normalize_device("PKG0"), "pkg0");
        assert_eq!(normalize_device("__nvme__"), "nvme");
        assert_eq!(normalize_device("   "), "unknown");
    }

    #[test]
    fn test_same_device_across_backends() {
        let a = norm(RawReading::new("coretemp Package id 0", "temp", 62_000.0, RawUnit::MilliCelsius));
        let b = normalize(
            &RawReading::new("Coretemp  package_id_0", "temperature", 64.5, RawUnit::Celsius),
            &SourceId::new("sysinfo"),
            Utc::now(),
        );
        assert_eq!(a.id, b.id);
        assert_eq!(a.value, Some(62.0));
        assert_eq!(b.value, Some(64.5));
    }

    #[test]
    fn test_unit_conversion() {
        let r = norm(RawReading::new("cpu", "temp", 335.15, RawUnit::Kelvin));
        assert!((r.value.unwrap() - 62.0).abs() < 1e-9);

        let r = norm(RawReading::new("cpu", "temp", 212.0, RawUnit::Fahrenheit));
        assert!((r.value.unwrap() - 100.0).abs() < 1e-9);

        let r = norm(RawReading::new("cpu", "load", 0.25, RawUnit::Fraction));
        assert_eq!(r.value, Some(25.0));

        let r = norm(RawReading::new("nct6775 pwm1", "pwm", 255.0, RawUnit::Pwm));
        assert_eq!(r.value, Some(100.0));

        let r = norm(RawReading::new("ram", "memory", 2.0, RawUnit::Kibibytes).with_capacity(4.0));
        assert_eq!(r.value, Some(2048.0));
        assert_eq!(r.capacity, Some(4096.0));
    }

    #[test]
    fn test_sentinels_are_invalid() {
        let cases = [
            RawReading::new("cpu", "temp", -1.0, RawUnit::Celsius),
            RawReading::new("cpu", "temp", f64::NAN, RawUnit::Celsius),
            RawReading::new("cpu", "temp", 0.0, RawUnit::Celsius),
            RawReading::new("cpu", "temp", 0.0, RawUnit::Kelvin),
            RawReading::new("cpu", "temp", 255_000.0, RawUnit::MilliCelsius),
            RawReading::new("cpu", "temp", f64::INFINITY, RawUnit::Celsius),
            RawReading::new("fan1", "fan", -1.0, RawUnit::Rpm),
            RawReading::new("fan1", "fan", -300.0, RawUnit::Rpm),
            RawReading::new("fan1", "fan", 65_535.0, RawUnit::Rpm),
            RawReading::new("cpu", "load", -3.0, RawUnit::Percent),
            RawReading::new("cpu", "load", 140.0, RawUnit::Percent),
            RawReading::new("ram", "memory", -5.0, RawUnit::Bytes),
            RawReading::new("ram", "memory", 5.0, RawUnit::Bytes).with_capacity(0.0),
            RawReading::new("/", "disk", 10.0, RawUnit::Bytes).with_capacity(5.0),
            RawReading::new("cpu", "frequency", f64::NAN, RawUnit::Native),
        ];
        for raw in cases {
            let r = norm(raw.clone());
            assert!(!r.is_valid(), "{:?} normalized to valid {:?}", raw, r.value);
            assert_eq!(r.value, None);
        }
    }

    #[test]
    fn test_stopped_fan_is_valid_zero() {
        let r = norm(RawReading::new("fan2", "fan", 0.0, RawUnit::Rpm));
        assert_eq!(r.value, Some(0.0));
    }

    #[test]
    fn test_utilization_rounding_clamps() {
        let r = norm(RawReading::new("cpu", "usage", 100.4, RawUnit::Percent));
        assert_eq!(r.value, Some(100.0));
    }

    #[test]
    fn test_unknown_metric_passes_through() {
        let r = norm(RawReading::new("CPU", "Frequency", 3600.0, RawUnit::Native));
        assert_eq!(r.id.kind, MetricKind::Other);
        assert_eq!(r.id.device, "cpu/frequency");
        assert_eq!(r.value, Some(3600.0));
    }

    #[test]
    fn test_label_defaults_to_device() {
        let r = norm(RawReading::new(" Package id 0 ", "temp", 50.0, RawUnit::Celsius));
        assert_eq!(r.label, "Package id 0");

        let r = norm(
            RawReading::new("/home", "disk", 1.0, RawUnit::Bytes)
                .with_capacity(2.0)
                .with_label("nvme0n1p2 (/home)"),
        );
        assert_eq!(r.label, "nvme0n1p2 (/home)");
        assert_eq!(r.id.device, "/home");
    }
}
