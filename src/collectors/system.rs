use crate::collectors::gpu;
use crate::state::{now_unix, MetricsSnapshot, RamReading, SystemInfo};
#[cfg(target_os = "linux")]
use std::fs;
use sysinfo::{ComponentExt, CpuExt, System, SystemExt};

pub struct SystemProbe {
    system: System,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            system: System::new_all(),
        }
    }

    // sysinfo derives CPU usage from the delta between two refreshes, so
    // callers prime once and wait a moment before the first real snapshot.
    pub fn prime(&mut self) {
        self.system.refresh_cpu();
        self.system.refresh_memory();
    }

    pub fn snapshot(&mut self) -> MetricsSnapshot {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        self.system.refresh_components_list();
        self.system.refresh_components();

        let cpu_usage_percent = if self.system.cpus().is_empty() {
            None
        } else {
            let sum: f32 = self.system.cpus().iter().map(|c| c.cpu_usage()).sum();
            Some((sum / self.system.cpus().len() as f32) as f64)
        };

        let memory_total_bytes = self.system.total_memory() * 1024;
        let memory_free_bytes = self.system.available_memory() * 1024;
        let ram = if memory_total_bytes == 0 {
            None
        } else {
            Some(RamReading::from_total_free(
                bytes_to_gb(memory_total_bytes),
                bytes_to_gb(memory_free_bytes),
            ))
        };

        MetricsSnapshot {
            taken_at_unix: now_unix(),
            cpu_usage_percent,
            cpu_temp_celsius: self.cpu_temp(),
            ram,
            gpu: gpu::probe_gpu(),
        }
    }

    pub fn info(&self) -> SystemInfo {
        let memory_total_bytes = self.system.total_memory() * 1024;
        SystemInfo {
            host_name: self.system.host_name(),
            os_name: self.system.name(),
            os_version: self.system.os_version(),
            kernel_version: self.system.kernel_version(),
            cpu_brand: self.system.cpus().first().map(|c| c.brand().to_string()),
            cpu_core_count: self.system.cpus().len() as u32,
            ram_total_gb: if memory_total_bytes == 0 {
                None
            } else {
                Some(bytes_to_gb(memory_total_bytes))
            },
            gpu_name: None,
        }
    }

    fn cpu_temp(&self) -> Option<f64> {
        let mut best: Option<f64> = None;
        for component in self.system.components() {
            let label = component.label().to_lowercase();
            if !is_cpu_temp_label(&label) {
                continue;
            }
            let value = component.temperature() as f64;
            if value > 0.0 {
                best = Some(best.map_or(value, |b| b.max(value)));
            }
        }

        if best.is_none() {
            best = hottest_thermal_zone();
        }
        best
    }
}

fn is_cpu_temp_label(label: &str) -> bool {
    let has_gpu_marker = ["gpu", "nvidia", "amdgpu", "radeon"]
        .iter()
        .any(|m| label.contains(m));
    if has_gpu_marker {
        return false;
    }

    [
        "cpu", "core", "package", "tctl", "tdie", "k10temp", "coretemp",
    ]
    .iter()
    .any(|m| label.contains(m))
}

#[cfg(target_os = "linux")]
fn hottest_thermal_zone() -> Option<f64> {
    let entries = fs::read_dir("/sys/class/thermal").ok()?;

    let mut best: Option<f64> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|v| v.to_str()) else {
            continue;
        };
        if !name.starts_with("thermal_zone") {
            continue;
        }

        let Ok(raw) = fs::read_to_string(path.join("temp")) else {
            continue;
        };
        let Ok(value) = raw.trim().parse::<f64>() else {
            continue;
        };
        let celsius = if value > 1000.0 { value / 1000.0 } else { value };
        if celsius > 0.0 {
            best = Some(best.map_or(celsius, |b| b.max(celsius)));
        }
    }

    best
}

#[cfg(not(target_os = "linux"))]
fn hottest_thermal_zone() -> Option<f64> {
    None
}

fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0 / 1024.0
}
