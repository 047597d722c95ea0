//! General system-inventory backend built on the `sysinfo` crate.

use sysinfo::{Components, Disks, System};

use super::{qualify_duplicates, SensorBackend};
use crate::error::SourceError;
use crate::model::{RawReading, RawUnit, SourceId};

/// Source id of this backend.
const SOURCE_ID: &str = "sysinfo";

/// Inventory backend: CPU load and clock, memory, swap, disks and
/// whatever temperature components the OS exposes.
pub struct SysinfoBackend {
    system: System,
    disks: Disks,
    components: Components,
    per_core: bool,
}

impl SysinfoBackend {
    /// Creates the backend. Per-core utilization is off by default.
    pub fn new() -> Self {
        Self {
            system: System::new(),
            disks: Disks::new_with_refreshed_list(),
            components: Components::new_with_refreshed_list(),
            per_core: false,
        }
    }

    /// Also report utilization of each logical core.
    pub fn with_per_core(mut self, per_core: bool) -> Self {
        self.per_core = per_core;
        self
    }

    fn read_cpu(&mut self, out: &mut Vec<RawReading>) {
        self.system.refresh_cpu();

        let global = self.system.global_cpu_info();
        out.push(RawReading::new(
            "cpu",
            "usage",
            f64::from(global.cpu_usage()),
            RawUnit::Percent,
        ));

        if let Some(first) = self.system.cpus().first() {
            out.push(RawReading::new(
                "cpu",
                "frequency",
                first.frequency() as f64,
                RawUnit::Native,
            ));
        }

        if self.per_core {
            for (index, cpu) in self.system.cpus().iter().enumerate() {
                out.push(
                    RawReading::new(
                        format!("cpu core {}", index),
                        "usage",
                        f64::from(cpu.cpu_usage()),
                        RawUnit::Percent,
                    )
                    .with_label(cpu.name()),
                );
            }
        }
    }

    fn read_memory(&mut self, out: &mut Vec<RawReading>) {
        self.system.refresh_memory();

        out.push(
            RawReading::new("ram", "memory", self.system.used_memory() as f64, RawUnit::Bytes)
                .with_capacity(self.system.total_memory() as f64),
        );

        let swap_total = self.system.total_swap();
        if swap_total > 0 {
            out.push(
                RawReading::new("swap", "swap", self.system.used_swap() as f64, RawUnit::Bytes)
                    .with_capacity(swap_total as f64),
            );
        }
    }

    fn read_disks(&mut self, out: &mut Vec<RawReading>) {
        self.disks.refresh();

        for disk in self.disks.list() {
            let total = disk.total_space();
            if total == 0 {
                continue;
            }
            let used = total.saturating_sub(disk.available_space());
            let name = disk.name().to_string_lossy().to_string();
            let mount = disk.mount_point().display().to_string();
            let label = if name.is_empty() || name == mount {
                mount.clone()
            } else {
                format!("{} ({})", name, mount)
            };
            out.push(
                RawReading::new(mount, "disk", used as f64, RawUnit::Bytes)
                    .with_capacity(total as f64)
                    .with_label(label),
            );
        }
    }

    /// Component labels follow hwmon's `"{chip} {label}"`; identical chips
    /// repeat a label and get numbered like the hwmon backend does.
    fn read_components(&mut self, out: &mut Vec<RawReading>) {
        self.components.refresh();

        for component in self.components.list() {
            out.push(RawReading::new(
                component.label(),
                "temperature",
                f64::from(component.temperature()),
                RawUnit::Celsius,
            ));
        }
    }
}

impl Default for SysinfoBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorBackend for SysinfoBackend {
    fn id(&self) -> SourceId {
        SourceId::new(SOURCE_ID)
    }

    fn probe(&mut self) -> Result<(), SourceError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(SourceError::Unsupported(format!(
                "sysinfo does not support {}",
                std::env::consts::OS
            )));
        }
        // CPU usage is a delta between refreshes; prime the first sample.
        self.system.refresh_cpu();
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<RawReading>, SourceError> {
        let mut readings = Vec::new();
        self.read_cpu(&mut readings);
        self.read_memory(&mut readings);
        self.read_disks(&mut readings);
        self.read_components(&mut readings);
        qualify_duplicates(&mut readings);
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetricKind;
    use crate::normalize::normalize_batch;
    use chrono::Utc;

    #[test]
    fn test_reads_cpu_and_memory() {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return;
        }
        let mut backend = SysinfoBackend::new().with_per_core(true);
        backend.probe().unwrap();
        let raws = backend.read().unwrap();
        let readings = normalize_batch(&raws, &backend.id(), Utc::now());

        let cpu = readings
            .iter()
            .find(|r| r.id.device == "cpu" && r.id.kind == MetricKind::Utilization)
            .expect("global cpu usage");
        assert!(cpu.source.as_str() == "sysinfo");

        let ram = readings
            .iter()
            .find(|r| r.id.device == "ram" && r.id.kind == MetricKind::MemoryUsage)
            .expect("ram usage");
        assert!(ram.capacity.unwrap_or(0.0) > 0.0);
        assert!(ram.is_valid());

        assert!(readings
            .iter()
            .any(|r| r.id.device.starts_with("cpu_core_")));

        let ids: std::collections::HashSet<_> = readings.iter().map(|r| &r.id).collect();
        assert_eq!(ids.len(), readings.len());
    }
}
