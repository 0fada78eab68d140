use crate::state::GpuReading;
use std::process::Command;

// First GPU only. The tool targets single-GPU workstations; on multi-adapter
// rigs the primary card is the one under load.
pub fn probe_gpu() -> Option<GpuReading> {
    let output = run_nvidia_smi(&[
        "--query-gpu=name,temperature.gpu,utilization.gpu,memory.used,memory.total,power.draw",
        "--format=csv,noheader,nounits",
    ])?;
    if !output.status.success() {
        return None;
    }

    let text = String::from_utf8(output.stdout).ok()?;
    text.lines().find_map(parse_gpu_line)
}

fn parse_gpu_line(line: &str) -> Option<GpuReading> {
    let parts: Vec<&str> = line.split(',').map(|v| v.trim()).collect();
    if parts.len() < 6 {
        return None;
    }

    let name = parts[0].to_string();
    if name.is_empty() {
        return None;
    }
    let temperature_celsius = parse_f64_loose(parts[1])?;
    let utilization_percent = parse_f64_loose(parts[2])?;
    let memory_used_mb = parse_f64_loose(parts[3])?;
    let memory_total_mb = parse_f64_loose(parts[4])?;
    // power.draw shows up as [N/A] on boards without a power sensor.
    let power_watts = parse_f64_loose(parts[5]);

    Some(GpuReading {
        name,
        temperature_celsius,
        utilization_percent,
        memory_used_mb,
        memory_total_mb,
        power_watts,
    })
}

fn run_nvidia_smi(args: &[&str]) -> Option<std::process::Output> {
    if let Ok(output) = Command::new("nvidia-smi").args(args).output() {
        return Some(output);
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(output) = Command::new(r"C:\Windows\System32\nvidia-smi.exe")
            .args(args)
            .output()
        {
            return Some(output);
        }
    }

    None
}

fn parse_f64_loose(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Some(v);
    }

    if let Ok(v) = trimmed.replace(',', ".").parse::<f64>() {
        return Some(v);
    }

    let filtered: String = trimmed
        .chars()
        .filter(|c| {
            c.is_ascii_digit()
                || *c == '.'
                || *c == ','
                || *c == 'e'
                || *c == 'E'
                || *c == '-'
                || *c == '+'
        })
        .collect();
    if filtered.is_empty() {
        return None;
    }

    filtered.replace(',', ".").parse::<f64>().ok()
}
