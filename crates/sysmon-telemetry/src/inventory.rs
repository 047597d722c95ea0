//! Static hardware facts, collected once at startup.

use serde::Serialize;
use std::path::Path;
use sysinfo::System;

use crate::source::{gpu_names, DEFAULT_HWMON_ROOT};

/// Host and CPU description that does not change between polls.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HardwareInventory {
    pub host_name: String,
    pub os: String,
    pub kernel: String,
    pub cpu_brand: String,
    pub logical_cores: usize,
    pub physical_cores: Option<usize>,
    /// Clock of the first core at collection time, in MHz.
    pub base_frequency_mhz: u64,
    /// Total RAM in bytes.
    pub total_memory: u64,
    /// GPUs with a hwmon chip, by product name where known.
    pub gpus: Vec<String>,
}

impl HardwareInventory {
    /// Collects the inventory from the running host.
    pub fn collect() -> Self {
        Self::collect_with_hwmon_root(Path::new(DEFAULT_HWMON_ROOT))
    }

    /// Like [`collect`](Self::collect), looking for GPUs under `hwmon_root`.
    pub fn collect_with_hwmon_root(hwmon_root: &Path) -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();

        let cpus = system.cpus();
        let cpu_brand = cpus
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            host_name: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            os: System::long_os_version().unwrap_or_else(|| "unknown".to_string()),
            kernel: System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
            cpu_brand,
            logical_cores: cpus.len(),
            physical_cores: system.physical_core_count(),
            base_frequency_mhz: cpus.first().map_or(0, |cpu| cpu.frequency()),
            total_memory: system.total_memory(),
            gpus: gpu_names(hwmon_root),
        }
    }

    /// One-line summary, e.g. `"Intel(R) Core(TM) i7 (8 cores @ 3.60 GHz), 15.5 GB RAM"`.
    pub fn summary(&self) -> String {
        let cores = self.physical_cores.unwrap_or(self.logical_cores);
        let mut summary = format!(
            "{} ({} cores @ {}), {} RAM",
            self.cpu_brand,
            cores,
            crate::format::clock_mhz(self.base_frequency_mhz as f64),
            crate::format::bytes(self.total_memory as f64),
        );
        if !self.gpus.is_empty() {
            summary.push_str(", GPU: ");
            summary.push_str(&self.gpus.join(", "));
        }
        summary
    }
}
