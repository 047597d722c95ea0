//! Plain-text rendering of a snapshot.

use std::fmt::Write;
use sysmon_telemetry::{format, HardwareInventory, MetricKind, Snapshot, SourceHealth};

/// Section heading per metric kind.
fn heading(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::Temperature => "Temperatures",
        MetricKind::FanSpeed => "Fans",
        MetricKind::Utilization => "Load",
        MetricKind::MemoryUsage => "Memory",
        MetricKind::DiskUsage => "Disks",
        MetricKind::Other => "Other",
    }
}

/// Renders `snapshot` as a multi-line report.
pub fn render(
    snapshot: &Snapshot,
    inventory: &HardwareInventory,
    show_alternates: bool,
) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{} | {}", inventory.host_name, inventory.summary());
    if snapshot.is_initial() {
        let _ = writeln!(out, "Waiting for first poll...");
        return out;
    }
    let _ = writeln!(
        out,
        "Snapshot #{} at {} ({} sensors, {} stale)",
        snapshot.sequence,
        snapshot.captured_at.format("%H:%M:%S%.3f"),
        snapshot.len(),
        snapshot.stale_count()
    );

    for kind in MetricKind::ALL {
        let mut entries = snapshot.by_kind(kind).peekable();
        if entries.peek().is_none() {
            continue;
        }
        let _ = writeln!(out, "\n{}", heading(kind));
        for entry in entries {
            let stale = if entry.is_stale() {
                format!(" (stale {})", entry.missed_cycles)
            } else {
                String::new()
            };
            let _ = writeln!(
                out,
                "  {:<28} {:>24}  [{}]{}",
                entry.primary.label,
                format::reading(&entry.primary),
                entry.primary.source,
                stale
            );
            if show_alternates {
                for alternate in &entry.alternates {
                    let _ = writeln!(
                        out,
                        "  {:<28} {:>24}  [{}]",
                        "",
                        format::reading(alternate),
                        alternate.source
                    );
                }
            }
        }
    }

    let _ = writeln!(out, "\nSources");
    for (id, status) in &snapshot.sources {
        let _ = write!(
            out,
            "  {:<12} {:<12} {:<9} {:>5} ms",
            id.as_str(),
            status.health.to_string(),
            status.outcome.to_string(),
            status.elapsed_ms
        );
        if status.health != SourceHealth::Healthy {
            if let Some(detail) = &status.detail {
                let _ = write!(out, "  {}", detail);
            }
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use sysmon_telemetry::{
        CycleOutcome, Reading, SensorId, SnapshotEntry, SourceId, SourceStatus,
    };

    fn reading(device: &str, kind: MetricKind, source: &str, value: Option<f64>) -> Reading {
        Reading {
            id: SensorId::new(device, kind),
            source: SourceId::new(source),
            label: device.to_string(),
            value,
            capacity: None,
            captured_at: Utc::now(),
        }
    }

    fn snapshot() -> Snapshot {
        let mut entries = BTreeMap::new();
        entries.insert(
            SensorId::new("pkg0", MetricKind::Temperature),
            SnapshotEntry {
                primary: reading("pkg0", MetricKind::Temperature, "hwmon", Some(62.0)),
                alternates: vec![reading(
                    "pkg0",
                    MetricKind::Temperature,
                    "sysinfo",
                    Some(65.0),
                )],
                missed_cycles: 0,
            },
        );
        entries.insert(
            SensorId::new("fan1", MetricKind::FanSpeed),
            SnapshotEntry {
                primary: reading("fan1", MetricKind::FanSpeed, "hwmon", Some(1150.0)),
                alternates: Vec::new(),
                missed_cycles: 2,
            },
        );

        let mut sources = BTreeMap::new();
        sources.insert(
            SourceId::new("hwmon"),
            SourceStatus {
                health: SourceHealth::Healthy,
                outcome: CycleOutcome::Success,
                elapsed_ms: 3,
                detail: None,
            },
        );
        sources.insert(
            SourceId::new("sysinfo"),
            SourceStatus {
                health: SourceHealth::Degraded,
                outcome: CycleOutcome::Timeout,
                elapsed_ms: 800,
                detail: Some("no response within 800ms".to_string()),
            },
        );

        Snapshot {
            sequence: 7,
            captured_at: Utc::now(),
            entries,
            sources,
        }
    }

    #[test]
    fn test_render_sections() {
        let text = render(&snapshot(), &HardwareInventory::default(), false);
        assert!(text.contains("Snapshot #7"));
        assert!(text.contains("Temperatures"));
        assert!(text.contains("62°C"));
        assert!(!text.contains("65°C"));
        assert!(text.contains("Fans"));
        assert!(text.contains("1150 RPM"));
        assert!(text.contains("(stale 2)"));
        assert!(!text.contains("Disks"));
        assert!(text.contains("degraded"));
        assert!(text.contains("no response within 800ms"));
    }

    #[test]
    fn test_render_alternates() {
        let text = render(&snapshot(), &HardwareInventory::default(), true);
        assert!(text.contains("65°C"));
        assert!(text.contains("[sysinfo]"));
    }

    #[test]
    fn test_render_before_first_poll() {
        let text = render(&Snapshot::empty(), &HardwareInventory::default(), false);
        assert!(text.contains("Waiting for first poll"));
        assert!(!text.contains("Sources"));
    }
}
