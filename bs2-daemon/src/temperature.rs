//! Temperature provider
//!
//! The control loop pulls one [`TempReading`] per tick through the
//! [`TemperatureProvider`] seam. The default implementation scans Linux hwmon
//! for CPU and GPU package temperatures; tests script their own readings.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use bs2_core::TempReading;

/// CPU hwmon driver names worth sampling
const CPU_CHIP_NAMES: &[&str] = &["coretemp", "k10temp", "zenpower", "cpu_thermal"];

/// GPU hwmon driver names worth sampling
const GPU_CHIP_NAMES: &[&str] = &["amdgpu", "nouveau", "radeon", "i915"];

/// Source of per-tick temperature readings
pub trait TemperatureProvider: Send {
    /// Pull one fresh reading. A failed read returns `success = false` with
    /// an error message; the loop handles recovery.
    fn sample(&mut self) -> TempReading;
}

/// Reads CPU/GPU temperatures from `/sys/class/hwmon`
#[derive(Debug)]
pub struct HwmonProvider {
    base: PathBuf,
}

impl HwmonProvider {
    pub fn new() -> Self {
        Self {
            base: PathBuf::from("/sys/class/hwmon"),
        }
    }

    /// Provider rooted at an alternate hwmon tree (for tests)
    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    /// Hottest temp*_input under a chip directory, in whole °C
    fn read_chip_max(chip_dir: &Path) -> Option<i32> {
        let mut hottest: Option<i32> = None;
        let entries = fs::read_dir(chip_dir).ok()?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("temp") || !name.ends_with("_input") {
                continue;
            }
            if let Ok(contents) = fs::read_to_string(entry.path()) {
                if let Ok(millidegrees) = contents.trim().parse::<i64>() {
                    let celsius = (millidegrees / 1000) as i32;
                    if celsius > 0 && celsius < 150 {
                        hottest = Some(hottest.map_or(celsius, |h: i32| h.max(celsius)));
                    }
                }
            }
        }
        hottest
    }

    fn scan(&self) -> (i32, i32) {
        let mut cpu = 0;
        let mut gpu = 0;

        let entries = match fs::read_dir(&self.base) {
            Ok(entries) => entries,
            Err(_) => return (0, 0),
        };

        for entry in entries.flatten() {
            let chip_dir = entry.path();
            let chip_name = fs::read_to_string(chip_dir.join("name"))
                .map(|s| s.trim().to_string())
                .unwrap_or_default();

            if CPU_CHIP_NAMES.iter().any(|n| chip_name.contains(n)) {
                if let Some(temp) = Self::read_chip_max(&chip_dir) {
                    cpu = cpu.max(temp);
                }
            } else if GPU_CHIP_NAMES.iter().any(|n| chip_name.contains(n)) {
                if let Some(temp) = Self::read_chip_max(&chip_dir) {
                    gpu = gpu.max(temp);
                }
            }
        }

        (cpu, gpu)
    }
}

impl Default for HwmonProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TemperatureProvider for HwmonProvider {
    fn sample(&mut self) -> TempReading {
        let (cpu, gpu) = self.scan();
        if cpu == 0 && gpu == 0 {
            debug!("SENSOR: no usable hwmon temperature found");
            return TempReading {
                cpu: 0,
                gpu: 0,
                max: 0,
                success: false,
                error: "no usable hwmon temperature".to_string(),
            };
        }
        TempReading {
            cpu,
            gpu,
            max: cpu.max(gpu),
            success: true,
            error: String::new(),
        }
    }
}
