//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ClearmarkError, ClearmarkResult};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Media-transform engine and detection defaults.
    pub engine: EngineDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Defaults for the external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineDefaults {
    /// Path or name of the ffmpeg binary.
    pub ffmpeg_path: String,

    /// Path or name of the ffprobe binary.
    pub ffprobe_path: String,

    /// Upper bound on concurrent detector calls.
    pub detection_concurrency: usize,

    /// Fixed sample count; `0` derives it from the sampling interval.
    pub sample_count: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "clearmark=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            detection_concurrency: 4,
            sample_count: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path.
    pub fn load_from(path: &Path) -> ClearmarkResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| ClearmarkError::config(format!("{}: {e}", path.display())))
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("clearmark").join("config.json")
}
