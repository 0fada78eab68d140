use crate::config::StressConfig;
use crate::state::TestRun;

#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregates {
    pub max_gpu_temp_celsius: Option<f64>,
    pub avg_gpu_temp_celsius: Option<f64>,
    pub max_gpu_utilization_percent: Option<f64>,
    pub max_cpu_usage_percent: Option<f64>,
    pub min_ram_free_gb: Option<f64>,
}

impl Aggregates {
    pub fn compute(run: &TestRun) -> Self {
        let mut max_gpu_temp: Option<f64> = None;
        let mut gpu_temp_sum = 0.0;
        let mut gpu_temp_count = 0usize;
        let mut max_gpu_util: Option<f64> = None;
        let mut max_cpu: Option<f64> = None;
        let mut min_ram_free: Option<f64> = None;

        for snap in run.observations() {
            if let Some(gpu) = &snap.gpu {
                max_gpu_temp = fold_max(max_gpu_temp, gpu.temperature_celsius);
                gpu_temp_sum += gpu.temperature_celsius;
                gpu_temp_count += 1;
                max_gpu_util = fold_max(max_gpu_util, gpu.utilization_percent);
            }
            if let Some(cpu) = snap.cpu_usage_percent {
                max_cpu = fold_max(max_cpu, cpu);
            }
            if let Some(ram) = &snap.ram {
                min_ram_free = fold_min(min_ram_free, ram.free_gb);
            }
        }

        let avg_gpu_temp = if gpu_temp_count > 0 {
            Some(round1(gpu_temp_sum / gpu_temp_count as f64))
        } else {
            None
        };

        Self {
            max_gpu_temp_celsius: max_gpu_temp,
            avg_gpu_temp_celsius: avg_gpu_temp,
            max_gpu_utilization_percent: max_gpu_util,
            max_cpu_usage_percent: max_cpu,
            min_ram_free_gb: min_ram_free,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarnReason {
    HighGpuTemp,
    LowFreeRam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    PassedWithWarning(WarnReason),
    Failed,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Passed => "PASSED",
            Verdict::PassedWithWarning(_) => "PASSED_WITH_WARNING",
            Verdict::Failed => "FAILED",
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Verdict::Passed => "system stable",
            Verdict::PassedWithWarning(WarnReason::HighGpuTemp) => "high GPU temperature",
            Verdict::PassedWithWarning(WarnReason::LowFreeRam) => "low free RAM",
            Verdict::Failed => "crashes detected",
        }
    }
}

// Rules are ordered by severity; the first match wins. A missing aggregate
// cannot trigger its rule.
pub fn decide(run: &TestRun, aggregates: &Aggregates, cfg: &StressConfig) -> Verdict {
    if !run.crash_events.is_empty() {
        return Verdict::Failed;
    }

    if let Some(temp) = aggregates.max_gpu_temp_celsius {
        if temp > cfg.gpu_temp_warn_celsius {
            return Verdict::PassedWithWarning(WarnReason::HighGpuTemp);
        }
    }

    if let Some(free) = aggregates.min_ram_free_gb {
        if free < cfg.min_free_ram_gb {
            return Verdict::PassedWithWarning(WarnReason::LowFreeRam);
        }
    }

    Verdict::Passed
}

fn fold_max(acc: Option<f64>, value: f64) -> Option<f64> {
    Some(acc.map_or(value, |a| a.max(value)))
}

fn fold_min(acc: Option<f64>, value: f64) -> Option<f64> {
    Some(acc.map_or(value, |a| a.min(value)))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
