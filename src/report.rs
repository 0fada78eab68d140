use crate::state::TestRun;
use crate::verdict::{Aggregates, Verdict};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};
use thiserror::Error;
use tracing::warn;

const NO_DATA: &str = "no data";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

// Pure: the same run, aggregates and verdict always produce identical text.
pub fn render(run: &TestRun, aggregates: &Aggregates, verdict: Verdict) -> String {
    let mut out: Vec<String> = Vec::new();

    let banner = "=".repeat(50);
    out.push(banner.clone());
    out.push(" STRESS TEST REPORT".to_string());
    out.push(banner);
    out.push(String::new());

    out.push(section("General Info"));
    out.push(format!("Computer name: {}", fmt_text(&run.system.host_name)));
    out.push(format!("Started: {}", format_unix(run.started_at_unix)));
    out.push(format!("Finished: {}", format_unix(run.ended_at_unix)));
    out.push(format!(
        "Requested duration: {} s",
        run.requested_duration_secs
    ));
    out.push(format!("Sample interval: {} s", run.interval_secs));
    out.push(format!("Samples collected: {}", run.samples.len()));
    out.push(format!("Run status: {}", run_status(run)));
    out.push(String::new());

    out.push(section("System"));
    out.push(format!(
        "OS: {} {}",
        fmt_text(&run.system.os_name),
        run.system.os_version.clone().unwrap_or_default()
    ));
    out.push(format!("Kernel: {}", fmt_text(&run.system.kernel_version)));
    out.push(format!(
        "CPU: {} ({} cores)",
        fmt_text(&run.system.cpu_brand),
        run.system.cpu_core_count
    ));
    out.push(format!("RAM total: {}", fmt_gb(run.system.ram_total_gb)));
    out.push(format!("GPU: {}", fmt_text(&run.system.gpu_name)));
    out.push(String::new());

    out.push(section("Initial State"));
    push_snapshot_lines(&mut out, run);
    out.push(String::new());

    out.push(section("Peak Values Under Load"));
    out.push(format!(
        "Max CPU usage: {}",
        fmt_percent(aggregates.max_cpu_usage_percent)
    ));
    out.push(format!(
        "Max GPU temp: {}",
        fmt_celsius(aggregates.max_gpu_temp_celsius)
    ));
    out.push(format!(
        "Avg GPU temp: {}",
        fmt_celsius(aggregates.avg_gpu_temp_celsius)
    ));
    out.push(format!(
        "Max GPU load: {}",
        fmt_percent(aggregates.max_gpu_utilization_percent)
    ));
    out.push(format!(
        "Min free RAM: {}",
        fmt_gb(aggregates.min_ram_free_gb)
    ));
    out.push(String::new());

    out.push(section("Crashes"));
    if run.crash_events.is_empty() {
        out.push("none".to_string());
    } else {
        for (idx, event) in run.crash_events.iter().enumerate() {
            out.push(format!(
                "{}. [{}] {}",
                idx + 1,
                format_unix(event.at_unix),
                event.message
            ));
        }
    }
    out.push(String::new());

    out.push(section("Overall Verdict"));
    out.push(format!("{} ({})", verdict.label(), verdict.reason()));
    out.push(String::new());

    out.join("\n")
}

// Writes the report file and echoes the text to the console. Both sides are
// attempted regardless of the other's outcome; only the file write failure
// propagates.
pub fn publish(text: &str, path: &Path) -> Result<(), ReportError> {
    let write_result = fs::write(path, text).map_err(|source| ReportError::Write {
        path: path.display().to_string(),
        source,
    });

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout.write_all(text.as_bytes()) {
        warn!(error = %err, "console echo failed");
    }

    write_result
}

fn push_snapshot_lines(out: &mut Vec<String>, run: &TestRun) {
    let snap = &run.initial_snapshot;
    out.push(format!("CPU usage: {}", fmt_percent(snap.cpu_usage_percent)));
    out.push(format!("CPU temp: {}", fmt_celsius(snap.cpu_temp_celsius)));
    match &snap.ram {
        Some(ram) => out.push(format!(
            "RAM: {:.1}/{:.1} GB used ({:.0} %), {:.1} GB free",
            ram.used_gb, ram.total_gb, ram.usage_percent, ram.free_gb
        )),
        None => out.push(format!("RAM: {NO_DATA}")),
    }
    match &snap.gpu {
        Some(gpu) => {
            out.push(format!("GPU temp: {:.1} °C", gpu.temperature_celsius));
            out.push(format!("GPU load: {:.1} %", gpu.utilization_percent));
            out.push(format!(
                "GPU memory: {:.0}/{:.0} MB",
                gpu.memory_used_mb, gpu.memory_total_mb
            ));
            out.push(format!(
                "GPU power: {}",
                gpu.power_watts
                    .map(|v| format!("{v:.1} W"))
                    .unwrap_or_else(|| NO_DATA.to_string())
            ));
        }
        None => out.push(format!("GPU: {NO_DATA}")),
    }
}

fn run_status(run: &TestRun) -> &'static str {
    if run.completed {
        "completed"
    } else if run.interrupted {
        "interrupted by user"
    } else {
        "failed"
    }
}

fn section(title: &str) -> String {
    format!("--- {title} ---")
}

fn fmt_text(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| NO_DATA.to_string())
}

fn fmt_percent(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.1} %"))
        .unwrap_or_else(|| NO_DATA.to_string())
}

fn fmt_celsius(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.1} °C"))
        .unwrap_or_else(|| NO_DATA.to_string())
}

fn fmt_gb(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.1} GB"))
        .unwrap_or_else(|| NO_DATA.to_string())
}

fn format_unix(ts: i64) -> String {
    let st = UNIX_EPOCH + Duration::from_secs(ts.max(0) as u64);
    humantime::format_rfc3339_seconds(st).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CrashEvent, GpuReading, MetricsSnapshot, RamReading, SystemInfo};
    use crate::verdict::WarnReason;

    fn sample_run() -> TestRun {
        let snap = MetricsSnapshot {
            taken_at_unix: 1_700_000_000,
            cpu_usage_percent: Some(12.5),
            cpu_temp_celsius: Some(47.0),
            ram: Some(RamReading::from_total_free(32.0, 24.0)),
            gpu: Some(GpuReading {
                name: "NVIDIA GeForce RTX 3060".to_string(),
                temperature_celsius: 41.0,
                utilization_percent: 2.0,
                memory_used_mb: 459.0,
                memory_total_mb: 12288.0,
                power_watts: Some(22.5),
            }),
        };
        TestRun {
            started_at_unix: 1_700_000_000,
            ended_at_unix: 1_700_000_120,
            requested_duration_secs: 120,
            interval_secs: 5,
            system: SystemInfo {
                host_name: Some("rig-01".to_string()),
                os_name: Some("Windows".to_string()),
                os_version: Some("11 (22631)".to_string()),
                kernel_version: Some("10.0.22631".to_string()),
                cpu_brand: Some("AMD Ryzen 7 5800X".to_string()),
                cpu_core_count: 16,
                ram_total_gb: Some(32.0),
                gpu_name: Some("NVIDIA GeForce RTX 3060".to_string()),
            },
            initial_snapshot: snap.clone(),
            final_snapshot: snap.clone(),
            samples: vec![snap],
            crash_events: Vec::new(),
            completed: true,
            interrupted: false,
        }
    }

    fn sample_aggregates() -> Aggregates {
        Aggregates {
            max_gpu_temp_celsius: Some(83.0),
            avg_gpu_temp_celsius: Some(76.4),
            max_gpu_utilization_percent: Some(99.0),
            max_cpu_usage_percent: Some(97.4),
            min_ram_free_gb: Some(21.3),
        }
    }

    #[test]
    fn report_contains_every_section_in_order() {
        let text = render(&sample_run(), &sample_aggregates(), Verdict::Passed);
        let sections = [
            "--- General Info ---",
            "--- System ---",
            "--- Initial State ---",
            "--- Peak Values Under Load ---",
            "--- Crashes ---",
            "--- Overall Verdict ---",
        ];
        let mut last = 0;
        for header in sections {
            let pos = text.find(header).unwrap_or_else(|| {
                panic!("missing section header {header:?}");
            });
            assert!(pos >= last, "section {header:?} out of order");
            last = pos;
        }
    }

    #[test]
    fn rendering_twice_yields_identical_text() {
        let run = sample_run();
        let agg = sample_aggregates();
        let first = render(&run, &agg, Verdict::Passed);
        let second = render(&run, &agg, Verdict::Passed);
        assert_eq!(first, second);
    }

    #[test]
    fn absent_gpu_renders_no_data_placeholders() {
        let mut run = sample_run();
        run.initial_snapshot.gpu = None;
        run.final_snapshot.gpu = None;
        run.samples.clear();
        let agg = Aggregates {
            max_cpu_usage_percent: Some(50.0),
            min_ram_free_gb: Some(20.0),
            ..Aggregates::default()
        };
        let text = render(&run, &agg, Verdict::Passed);
        assert!(text.contains("GPU: no data"));
        assert!(text.contains("Max GPU temp: no data"));
        assert!(text.contains("Avg GPU temp: no data"));
        assert!(text.contains("Max GPU load: no data"));
    }

    #[test]
    fn crash_events_are_listed_numbered() {
        let mut run = sample_run();
        run.completed = false;
        run.crash_events = vec![
            CrashEvent {
                at_unix: 1_700_000_060,
                message: "metrics collection failed: probe backend gone".to_string(),
            },
            CrashEvent {
                at_unix: 1_700_000_065,
                message: "second failure".to_string(),
            },
        ];
        let text = render(&run, &sample_aggregates(), Verdict::Failed);
        assert!(text.contains("1. [2023-11-14T22:14:20Z] metrics collection failed"));
        assert!(text.contains("2. [2023-11-14T22:14:25Z] second failure"));
        assert!(!text.contains("\nnone\n"));
        assert!(text.contains("FAILED (crashes detected)"));
        assert!(text.contains("Run status: failed"));
    }

    #[test]
    fn warning_verdict_renders_label_and_reason() {
        let text = render(
            &sample_run(),
            &sample_aggregates(),
            Verdict::PassedWithWarning(WarnReason::LowFreeRam),
        );
        assert!(text.contains("PASSED_WITH_WARNING (low free RAM)"));
    }

    #[test]
    fn interrupted_run_is_labelled() {
        let mut run = sample_run();
        run.completed = false;
        run.interrupted = true;
        let text = render(&run, &sample_aggregates(), Verdict::Passed);
        assert!(text.contains("Run status: interrupted by user"));
    }

    #[test]
    fn publish_writes_the_exact_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.txt");
        let text = render(&sample_run(), &sample_aggregates(), Verdict::Passed);
        publish(&text, &path).expect("publish must succeed");
        let on_disk = fs::read_to_string(&path).expect("report readable");
        assert_eq!(on_disk, text);
    }
}
