use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub taken_at_unix: i64,
    pub cpu_usage_percent: Option<f64>,
    pub cpu_temp_celsius: Option<f64>,
    pub ram: Option<RamReading>,
    pub gpu: Option<GpuReading>,
}

impl MetricsSnapshot {
    // Every field absent. Used when collection itself is broken.
    pub fn empty(taken_at_unix: i64) -> Self {
        Self {
            taken_at_unix,
            cpu_usage_percent: None,
            cpu_temp_celsius: None,
            ram: None,
            gpu: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RamReading {
    pub total_gb: f64,
    pub free_gb: f64,
    pub used_gb: f64,
    pub usage_percent: f64,
}

impl RamReading {
    // The only constructor: used and usage_percent are always derived from
    // total/free, never stored independently.
    pub fn from_total_free(total_gb: f64, free_gb: f64) -> Self {
        let used_gb = (total_gb - free_gb).max(0.0);
        let usage_percent = if total_gb > 0.0 {
            (used_gb / total_gb * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            total_gb,
            free_gb,
            used_gb,
            usage_percent,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GpuReading {
    pub name: String,
    pub temperature_celsius: f64,
    pub utilization_percent: f64,
    pub memory_used_mb: f64,
    pub memory_total_mb: f64,
    pub power_watts: Option<f64>,
}

impl GpuReading {
    pub fn memory_free_gb(&self) -> f64 {
        (self.memory_total_mb - self.memory_used_mb).max(0.0) / 1024.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct SystemInfo {
    pub host_name: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub cpu_brand: Option<String>,
    pub cpu_core_count: u32,
    pub ram_total_gb: Option<f64>,
    pub gpu_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CrashEvent {
    pub at_unix: i64,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct TestRun {
    pub started_at_unix: i64,
    pub ended_at_unix: i64,
    pub requested_duration_secs: u64,
    pub interval_secs: u64,
    pub system: SystemInfo,
    pub initial_snapshot: MetricsSnapshot,
    pub final_snapshot: MetricsSnapshot,
    pub samples: Vec<MetricsSnapshot>,
    pub crash_events: Vec<CrashEvent>,
    pub completed: bool,
    pub interrupted: bool,
}

impl TestRun {
    // Boundary snapshots count as observations alongside the series, so even
    // a zero-duration run has data to classify.
    pub fn observations(&self) -> impl Iterator<Item = &MetricsSnapshot> {
        std::iter::once(&self.initial_snapshot)
            .chain(self.samples.iter())
            .chain(std::iter::once(&self.final_snapshot))
    }
}

#[derive(Debug, Error)]
#[error("metrics collection failed: {0}")]
pub struct CollectError(pub String);

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
