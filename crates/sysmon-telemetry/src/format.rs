//! Human-readable formatting for readings.

use crate::model::{MetricKind, Reading};

/// Formats a byte count with 1024-based units (e.g., "1.5 GB"). Non-finite input is "N/A".
pub fn bytes(value: f64) -> String {
    const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];
    if !value.is_finite() {
        return "N/A".to_string();
    }
    if value < 1024.0 {
        return format!("{:.0} B", value);
    }
    let mut scaled = value;
    let mut unit = 0;
    while scaled >= 1024.0 && unit < UNITS.len() {
        scaled /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", scaled, UNITS[unit - 1])
}

/// Formats a clock speed given in MHz (e.g., "3.60 GHz" or "800 MHz").
pub fn clock_mhz(mhz: f64) -> String {
    if mhz >= 1000.0 {
        format!("{:.2} GHz", mhz / 1000.0)
    } else {
        format!("{:.0} MHz", mhz)
    }
}

/// Formats a percentage with one decimal.
pub fn percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Formats a temperature, or "N/A" when there is no valid value.
pub fn temperature(value: Option<f64>) -> String {
    match value {
        Some(celsius) => format!("{:.0}°C", celsius),
        None => "N/A".to_string(),
    }
}

/// Formats a fan speed.
pub fn rpm(value: f64) -> String {
    format!("{:.0} RPM", value)
}

/// Formats a reading's value according to its kind.
///
/// Memory and disk readings show used/total and percent when capacity is known.
pub fn reading(reading: &Reading) -> String {
    let Some(value) = reading.value else {
        return "N/A".to_string();
    };
    match reading.id.kind {
        MetricKind::Temperature => temperature(Some(value)),
        MetricKind::FanSpeed => rpm(value),
        MetricKind::Utilization => percent(value),
        MetricKind::MemoryUsage | MetricKind::DiskUsage => match reading.capacity {
            Some(total) => format!(
                "{} / {} ({})",
                bytes(value),
                bytes(total),
                percent(reading.percent_of_capacity().unwrap_or(0.0))
            ),
            None => bytes(value),
        },
        MetricKind::Other => format!("{}", value),
    }
}
