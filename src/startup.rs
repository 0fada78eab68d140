use crate::collectors::models::{self, RuntimeInventory, SAFE_MODEL_SIZE_GB};
use crate::collectors::system::SystemProbe;
use crate::config::{Config, StressConfig};
use crate::state::{now_unix, MetricsSnapshot, SystemInfo};
use reqwest::Client;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};
use thiserror::Error;
use tracing::{info, warn};

const NO_DATA: &str = "no data";
const LOG_ABSENT: &str = "n/a";
// Below roughly one model layer of headroom the card starts swapping to RAM.
const MIN_FREE_VRAM_GB: f64 = 1.0;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to append startup log {path}: {source}")]
    Append {
        path: String,
        source: std::io::Error,
    },
}

pub async fn run(cfg: &Config) -> Result<(), StartupError> {
    let mut probe = SystemProbe::new();
    probe.prime();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let snapshot = probe.snapshot();
    let mut system = probe.info();
    system.gpu_name = snapshot.gpu.as_ref().map(|g| g.name.clone());

    let client = Client::builder()
        .user_agent("rigcheck/0.1.0")
        .build()
        .unwrap_or_else(|_| Client::new());
    let timeout = Duration::from_millis(cfg.startup.request_timeout_ms);
    let inventory =
        match models::fetch_inventory(&client, &cfg.startup.runtime_base_url, timeout).await {
            Ok(inventory) => Some(inventory),
            Err(err) => {
                warn!(
                    error = %err,
                    url = %cfg.startup.runtime_base_url,
                    "model runtime is unreachable"
                );
                None
            }
        };

    let block = format_status_block(&system, &snapshot, inventory.as_ref(), &cfg.stress);
    println!("{block}");

    let entry = format_log_entry(now_unix(), &system, &snapshot, inventory.as_ref());
    append_log_line(Path::new(&cfg.startup.log_path), &entry)?;
    info!(path = %cfg.startup.log_path, "startup entry appended");

    Ok(())
}

fn format_status_block(
    system: &SystemInfo,
    snapshot: &MetricsSnapshot,
    inventory: Option<&RuntimeInventory>,
    stress: &StressConfig,
) -> String {
    let os = match (&system.os_name, &system.os_version) {
        (Some(name), Some(version)) => format!("{name} {version}"),
        (Some(name), None) => name.clone(),
        _ => NO_DATA.to_string(),
    };

    let mut lines = vec![
        "rigcheck startup".to_string(),
        format!("Host: {}", text_or_no_data(&system.host_name)),
        format!("OS: {os}"),
        format!(
            "CPU: {} ({} cores)",
            text_or_no_data(&system.cpu_brand),
            system.cpu_core_count
        ),
        format!(
            "CPU usage: {} | temp {}",
            pct_or_no_data(snapshot.cpu_usage_percent),
            celsius_or_no_data(snapshot.cpu_temp_celsius)
        ),
    ];

    match &snapshot.ram {
        Some(ram) => lines.push(format!(
            "RAM: {:.1}/{:.1} GB used ({:.0} %), {:.1} GB free",
            ram.used_gb, ram.total_gb, ram.usage_percent, ram.free_gb
        )),
        None => lines.push(format!("RAM: {NO_DATA}")),
    }

    match &snapshot.gpu {
        Some(gpu) => lines.push(format!(
            "GPU: {} | temp {:.1} °C | load {:.0} % | mem {:.0}/{:.0} MB",
            gpu.name,
            gpu.temperature_celsius,
            gpu.utilization_percent,
            gpu.memory_used_mb,
            gpu.memory_total_mb
        )),
        None => lines.push(format!("GPU: {NO_DATA}")),
    }

    match inventory {
        Some(inventory) => {
            let version = inventory
                .version
                .as_deref()
                .map(|v| format!("version {v}"))
                .unwrap_or_else(|| "version unknown".to_string());
            if inventory.models.is_empty() {
                lines.push(format!("Model runtime: {version}, no models installed"));
            } else {
                lines.push(format!(
                    "Model runtime: {version}, {} models",
                    inventory.models.len()
                ));
                for model in &inventory.models {
                    let marker = if model.is_safe_size() { " [safe]" } else { "" };
                    lines.push(format!(
                        "  - {} {:.1} GB{}",
                        model.name,
                        model.size_gb(),
                        marker
                    ));
                }
                match inventory.recommended_model() {
                    Some(model) => lines.push(format!("Recommended model: {}", model.name)),
                    None => lines.push(format!(
                        "Recommended model: none under {SAFE_MODEL_SIZE_GB:.0} GB"
                    )),
                }
            }
        }
        None => lines.push("Model runtime: unavailable".to_string()),
    }

    if let Some(gpu) = &snapshot.gpu {
        if gpu.temperature_celsius > stress.gpu_temp_warn_celsius {
            lines.push(format!(
                "Warning: GPU temperature {:.1} °C is above the {:.1} °C threshold",
                gpu.temperature_celsius, stress.gpu_temp_warn_celsius
            ));
        }
        if gpu.memory_free_gb() < MIN_FREE_VRAM_GB {
            lines.push(format!(
                "Warning: free VRAM {:.1} GB is below {MIN_FREE_VRAM_GB:.1} GB",
                gpu.memory_free_gb()
            ));
        }
    }
    if let Some(ram) = &snapshot.ram {
        if ram.free_gb < stress.min_free_ram_gb {
            lines.push(format!(
                "Warning: free RAM {:.1} GB is below the {:.1} GB minimum",
                ram.free_gb, stress.min_free_ram_gb
            ));
        }
    }

    lines.join("\n")
}

fn format_log_entry(
    at_unix: i64,
    system: &SystemInfo,
    snapshot: &MetricsSnapshot,
    inventory: Option<&RuntimeInventory>,
) -> String {
    let mut fields = vec![
        format!("host={}", system.host_name.as_deref().unwrap_or(LOG_ABSENT)),
        format!("cpu_pct={}", kv_f64(snapshot.cpu_usage_percent)),
        format!("cpu_temp_c={}", kv_f64(snapshot.cpu_temp_celsius)),
    ];

    match &snapshot.ram {
        Some(ram) => {
            fields.push(format!("ram_used_gb={:.1}", ram.used_gb));
            fields.push(format!("ram_total_gb={:.1}", ram.total_gb));
            fields.push(format!("ram_free_gb={:.1}", ram.free_gb));
        }
        None => {
            fields.push(format!("ram_used_gb={LOG_ABSENT}"));
            fields.push(format!("ram_total_gb={LOG_ABSENT}"));
            fields.push(format!("ram_free_gb={LOG_ABSENT}"));
        }
    }

    match &snapshot.gpu {
        Some(gpu) => {
            fields.push(format!("gpu=\"{}\"", gpu.name));
            fields.push(format!("gpu_temp_c={:.1}", gpu.temperature_celsius));
        }
        None => {
            fields.push(format!("gpu={LOG_ABSENT}"));
            fields.push(format!("gpu_temp_c={LOG_ABSENT}"));
        }
    }

    match inventory {
        Some(inventory) => {
            fields.push(format!(
                "runtime_version={}",
                inventory.version.as_deref().unwrap_or(LOG_ABSENT)
            ));
            fields.push(format!("models={}", inventory.models.len()));
            fields.push(format!(
                "recommended={}",
                inventory
                    .recommended_model()
                    .map(|m| m.name.as_str())
                    .unwrap_or(LOG_ABSENT)
            ));
        }
        None => {
            fields.push(format!("runtime_version={LOG_ABSENT}"));
            fields.push(format!("models={LOG_ABSENT}"));
            fields.push(format!("recommended={LOG_ABSENT}"));
        }
    }

    format!("{} {}", format_unix(at_unix), fields.join(" "))
}

// Entries only ever get appended, earlier lines are never touched.
fn append_log_line(path: &Path, entry: &str) -> Result<(), StartupError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| StartupError::Append {
                path: path.display().to_string(),
                source,
            })?;
        }
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| StartupError::Append {
            path: path.display().to_string(),
            source,
        })?;

    writeln!(file, "{entry}").map_err(|source| StartupError::Append {
        path: path.display().to_string(),
        source,
    })
}

fn text_or_no_data(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| NO_DATA.to_string())
}

fn pct_or_no_data(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.1} %"))
        .unwrap_or_else(|| NO_DATA.to_string())
}

fn celsius_or_no_data(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.1} °C"))
        .unwrap_or_else(|| NO_DATA.to_string())
}

fn kv_f64(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.1}"))
        .unwrap_or_else(|| LOG_ABSENT.to_string())
}

fn format_unix(ts: i64) -> String {
    let ts = ts.max(0) as u64;
    humantime::format_rfc3339_seconds(UNIX_EPOCH + Duration::from_secs(ts)).to_string()
}
