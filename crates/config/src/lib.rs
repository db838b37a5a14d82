use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

// ── Journal ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Repository root holding `entries/`, `logs/` and the sync script.
    pub repo: String,
    pub entries_dirname: String,
    pub logs_dirname: String,
    /// Size (bytes) at or above which every append fires the sync script.
    pub max_file_bytes: u64,
    /// Add a weather line to the header of each new day file.
    pub with_weather: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            repo: ".".to_string(),
            entries_dirname: "entries".to_string(),
            logs_dirname: "logs".to_string(),
            max_file_bytes: 10 * 1024,
            with_weather: false,
        }
    }
}

impl JournalConfig {
    pub fn repo_path(&self) -> PathBuf {
        PathBuf::from(&self.repo)
    }

    pub fn logs_path(&self) -> PathBuf {
        self.repo_path().join(&self.logs_dirname)
    }
}

// ── Daemon ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub socket_path: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/daybook.sock".to_string(),
        }
    }
}

// ── Sync script ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Script path relative to the repository root.
    pub script: String,
    /// Program used to run the script; it receives the script path as its
    /// only argument.
    pub interpreter: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            script: "push.sh".to_string(),
            interpreter: "/bin/bash".to_string(),
        }
    }
}

// ── Weather enrichment ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// wttr.in location.  Empty lets the service geolocate the caller.
    pub location: String,
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            location: String::new(),
            timeout_secs: 5,
        }
    }
}

// ── Telemetry ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_file_name: String,
    /// Size at which the active log file is rotated.
    pub max_log_bytes: usize,
    /// Rotated backups kept beside the active log file.
    pub max_log_files: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file_name: "app.log".to_string(),
            max_log_bytes: 256 * 1024,
            max_log_files: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub journal: JournalConfig,
    pub daemon: DaemonConfig,
    pub sync: SyncConfig,
    pub weather: WeatherConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        // Environment overrides take precedence over the config file.
        if let Ok(value) = env::var("DAYBOOK_REPO") {
            if !value.is_empty() {
                config.journal.repo = value;
            }
        }
        if let Ok(value) = env::var("DAYBOOK_SOCKET") {
            if !value.is_empty() {
                config.daemon.socket_path = value;
            }
        }

        Ok(config)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
