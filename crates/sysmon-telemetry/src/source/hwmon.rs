//! Dedicated temperature/fan backend over the Linux hwmon sysfs tree.
//!
//! Each `/sys/class/hwmon/hwmonN` directory is one chip. Per chip we read:
//! - `tempK_input`: millidegrees Celsius, labelled by `tempK_label`
//! - `fanK_input`: RPM
//! - `pwmK`: fan duty cycle, 0-255
//! - `device/gpu_busy_percent`: GPU load on amdgpu
//! - `device/mem_info_vram_{used,total}`: VRAM on amdgpu
//!
//! A chip's `name` plus the channel label forms the device name, which
//! matches the component labels `sysinfo` builds from the same files.
//! Identical chips (two NVMe drives) are numbered in `hwmonN` order.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{qualify_duplicates, SensorBackend};
use crate::error::SourceError;
use crate::model::{RawReading, RawUnit, SourceId};

/// Default sysfs hwmon root.
pub const DEFAULT_HWMON_ROOT: &str = "/sys/class/hwmon";

/// Source id of this backend.
const SOURCE_ID: &str = "hwmon";

/// hwmon chip names registered by GPU drivers.
const GPU_DRIVERS: [&str; 5] = ["amdgpu", "radeon", "nouveau", "i915", "xe"];

/// Channel families exposed per chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Channel {
    Temp,
    Fan,
    Pwm,
}

/// hwmon sysfs backend.
pub struct HwmonBackend {
    root: PathBuf,
}

impl HwmonBackend {
    /// Creates a backend over the default hwmon root.
    pub fn new() -> Self {
        Self::with_root(DEFAULT_HWMON_ROOT)
    }

    /// Creates a backend over a specific root, e.g. a fake tree in tests.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn chips(&self) -> Result<Vec<PathBuf>, SourceError> {
        list_chips(&self.root)
    }

    /// Reads one chip directory.
    fn read_chip(chip: &Path, out: &mut Vec<RawReading>) {
        let chip_name = chip_name(chip);

        let mut channels = Vec::new();
        if let Ok(entries) = fs::read_dir(chip) {
            for entry in entries.flatten() {
                let file = entry.file_name().to_string_lossy().to_string();
                if let Some(channel) = parse_channel(&file) {
                    channels.push(channel);
                }
            }
        }
        channels.sort();

        for (channel, index) in channels {
            match channel {
                Channel::Temp => {
                    let label = read_sysfs_file(&chip.join(format!("temp{}_label", index)))
                        .unwrap_or_else(|_| format!("temp{}", index));
                    let value = read_number(&chip.join(format!("temp{}_input", index)));
                    out.push(RawReading::new(
                        format!("{} {}", chip_name, label),
                        "temp",
                        value,
                        RawUnit::MilliCelsius,
                    ));
                }
                Channel::Fan => {
                    let label = read_sysfs_file(&chip.join(format!("fan{}_label", index)))
                        .unwrap_or_else(|_| format!("fan{}", index));
                    let value = read_number(&chip.join(format!("fan{}_input", index)));
                    out.push(RawReading::new(
                        format!("{} {}", chip_name, label),
                        "fan",
                        value,
                        RawUnit::Rpm,
                    ));
                }
                Channel::Pwm => {
                    let value = read_number(&chip.join(format!("pwm{}", index)));
                    out.push(RawReading::new(
                        format!("{} pwm{}", chip_name, index),
                        "pwm",
                        value,
                        RawUnit::Pwm,
                    ));
                }
            }
        }

        let device = chip.join("device");
        let busy = device.join("gpu_busy_percent");
        if busy.exists() {
            out.push(RawReading::new(
                format!("{} busy", chip_name),
                "busy",
                read_number(&busy),
                RawUnit::Percent,
            ));
        }

        let vram_used = device.join("mem_info_vram_used");
        if vram_used.exists() {
            let mut vram = RawReading::new(
                format!("{} vram", chip_name),
                "memory",
                read_number(&vram_used),
                RawUnit::Bytes,
            );
            let total = read_number(&device.join("mem_info_vram_total"));
            if total.is_finite() {
                vram = vram.with_capacity(total);
            }
            out.push(vram);
        }
    }
}

/// Lists chip directories in `hwmonN` order (hwmon2 before hwmon10).
fn list_chips(root: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let entries = fs::read_dir(root).map_err(|e| SourceError::from_io(root, e))?;
    let mut chips: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    chips.sort_by_key(|path| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let index = name
            .trim_start_matches(|c: char| !c.is_ascii_digit())
            .parse::<u32>()
            .unwrap_or(u32::MAX);
        (index, name)
    });
    Ok(chips)
}

/// The chip's `name` attribute, or its directory name.
fn chip_name(chip: &Path) -> String {
    read_sysfs_file(&chip.join("name")).unwrap_or_else(|_| {
        chip.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "hwmon".to_string())
    })
}

/// Names of the GPUs that expose a hwmon chip under `root`, in `hwmonN` order.
///
/// Uses the board's `device/product_name` when the driver provides one,
/// otherwise the chip name. A missing root yields an empty list.
pub fn gpu_names(root: &Path) -> Vec<String> {
    let Ok(chips) = list_chips(root) else {
        return Vec::new();
    };
    chips
        .iter()
        .filter_map(|chip| {
            let name = chip_name(chip);
            let device = chip.join("device");
            let is_gpu = GPU_DRIVERS.contains(&name.as_str())
                || device.join("gpu_busy_percent").exists();
            if !is_gpu {
                return None;
            }
            Some(
                read_sysfs_file(&device.join("product_name"))
                    .ok()
                    .filter(|product| !product.is_empty())
                    .unwrap_or(name),
            )
        })
        .collect()
}

impl Default for HwmonBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorBackend for HwmonBackend {
    fn id(&self) -> SourceId {
        SourceId::new(SOURCE_ID)
    }

    fn probe(&mut self) -> Result<(), SourceError> {
        if !self.root.exists() {
            return Err(SourceError::Unsupported(format!(
                "{} not present",
                self.root.display()
            )));
        }
        let chips = self.chips()?;
        debug!("hwmon: {} chip(s) under {}", chips.len(), self.root.display());
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<RawReading>, SourceError> {
        let mut readings = Vec::new();
        for chip in self.chips()? {
            Self::read_chip(&chip, &mut readings);
        }
        qualify_duplicates(&mut readings);
        Ok(readings)
    }
}

/// Parses `temp3_input`, `fan1_input` or `pwm2` into a channel and index.
fn parse_channel(file: &str) -> Option<(Channel, u32)> {
    let (channel, rest) = if let Some(rest) = file.strip_prefix("temp") {
        (Channel::Temp, rest.strip_suffix("_input")?)
    } else if let Some(rest) = file.strip_prefix("fan") {
        (Channel::Fan, rest.strip_suffix("_input")?)
    } else if let Some(rest) = file.strip_prefix("pwm") {
        (Channel::Pwm, rest)
    } else {
        return None;
    };
    rest.parse().ok().map(|index| (channel, index))
}

/// Reads a numeric sysfs attribute. Unreadable or garbled files read as NaN,
/// which the normalizer turns into an invalid reading.
fn read_number(path: &Path) -> f64 {
    match read_sysfs_file(path) {
        Ok(content) => content.parse::<f64>().unwrap_or(f64::NAN),
        Err(e) => {
            debug!("hwmon: {}", e);
            f64::NAN
        }
    }
}

/// Reads a sysfs file and returns its trimmed content.
fn read_sysfs_file(path: &Path) -> Result<String, SourceError> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| SourceError::from_io(path, e))
}
