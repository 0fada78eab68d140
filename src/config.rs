use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub stress: StressConfig,
    #[serde(default)]
    pub startup: StartupConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StressConfig {
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_gpu_temp_warn_celsius")]
    pub gpu_temp_warn_celsius: f64,
    #[serde(default = "default_min_free_ram_gb")]
    pub min_free_ram_gb: f64,
    #[serde(default = "default_output_path")]
    pub output_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StartupConfig {
    #[serde(default = "default_log_path")]
    pub log_path: String,
    #[serde(default = "default_runtime_base_url")]
    pub runtime_base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            interval_secs: default_interval_secs(),
            gpu_temp_warn_celsius: default_gpu_temp_warn_celsius(),
            min_free_ram_gb: default_min_free_ram_gb(),
            output_path: default_output_path(),
        }
    }
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            runtime_base_url: default_runtime_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("config validation error: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stress.interval_secs < 1 {
            return Err(ConfigError::Validation(
                "stress.interval_secs must be >= 1".to_string(),
            ));
        }
        if self.stress.gpu_temp_warn_celsius <= 0.0 {
            return Err(ConfigError::Validation(
                "stress.gpu_temp_warn_celsius must be > 0".to_string(),
            ));
        }
        if self.stress.min_free_ram_gb < 0.0 {
            return Err(ConfigError::Validation(
                "stress.min_free_ram_gb must be >= 0".to_string(),
            ));
        }
        if self.stress.output_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "stress.output_path must not be empty".to_string(),
            ));
        }
        if self.startup.log_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "startup.log_path must not be empty".to_string(),
            ));
        }
        if self.startup.runtime_base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "startup.runtime_base_url must not be empty".to_string(),
            ));
        }
        if self.startup.request_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "startup.request_timeout_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

const fn default_duration_secs() -> u64 {
    120
}

const fn default_interval_secs() -> u64 {
    5
}

const fn default_gpu_temp_warn_celsius() -> f64 {
    85.0
}

const fn default_min_free_ram_gb() -> f64 {
    2.0
}

fn default_output_path() -> String {
    "stress_report.txt".to_string()
}

fn default_log_path() -> String {
    "startup_log.txt".to_string()
}

fn default_runtime_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

const fn default_request_timeout_ms() -> u64 {
    2000
}
