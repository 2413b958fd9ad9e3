use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory for the JSONL event log (distinct from tracing output).
    #[serde(default = "default_event_log_dir")]
    pub event_log_dir: PathBuf,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between scheduled scans, in milliseconds.
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    /// Whether the daemon starts the scheduler on boot.
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,

    /// Program that performs the actual filesystem scan.
    #[serde(default = "default_scan_command")]
    pub command: String,

    #[serde(default = "default_scan_args")]
    pub args: Vec<String>,

    /// Working directory the scanner is spawned in.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
}

fn default_scan_interval_ms() -> u64 {
    5 * 60 * 1000
}

fn default_auto_start() -> bool {
    true
}

fn default_scan_command() -> String {
    "pwsh".to_string()
}

fn default_scan_args() -> Vec<String> {
    vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-File".to_string(),
        "Monitor-ClaudeFiles.ps1".to_string(),
    ]
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: default_scan_interval_ms(),
            auto_start: default_auto_start(),
            command: default_scan_command(),
            args: default_scan_args(),
            working_dir: default_working_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Skip persisting scans that report zero file changes.
    #[serde(default = "default_skip_empty_scans")]
    pub skip_empty_scans: bool,
}

fn default_skip_empty_scans() -> bool {
    true
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            skip_empty_scans: default_skip_empty_scans(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,
}

fn default_page_size() -> i64 {
    50
}

fn default_max_page_size() -> i64 {
    100
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scantrack")
        .join("scantrack.db")
}

fn default_event_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scantrack")
        .join("events")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            event_log_dir: default_event_log_dir(),
            scheduler: SchedulerConfig::default(),
            ingest: IngestConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scantrack")
            .join("config.toml")
    }
}
