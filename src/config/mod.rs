use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod client;
pub mod validation;

pub use client::ClientConfig;
use validation::ConfigValidator;

/// Server process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub media: MediaConfig,
    pub sync: SyncConfig,
    #[serde(default)]
    pub power: PowerConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub interface: String,
    pub name: String,
}

/// Canonical media directory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub directory: PathBuf,
    pub supported_extensions: Vec<String>,
    #[serde(default = "default_duration_ms")]
    pub default_duration_ms: u64,
}

/// Remote source synchronization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub source_dir: PathBuf,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_true")]
    pub watch_source: bool,
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerConfig {
    pub inactivity_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    pub liveness_interval_seconds: u64,
    pub outbound_queue_capacity: usize,
}

fn default_duration_ms() -> u64 {
    10_000
}

fn default_poll_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_manifest_name() -> String {
    "playlist.toml".to_string()
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_seconds: 300,
        }
    }
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            liveness_interval_seconds: 30,
            outbound_queue_capacity: 32,
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

impl PowerConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_seconds)
    }
}

impl MediaConfig {
    pub fn default_duration(&self) -> Duration {
        Duration::from_millis(self.default_duration_ms)
    }
}

impl AppConfig {
    /// Default configuration rooted in the user's data directory
    pub fn default_for_platform() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kiosk-sync");

        Self {
            server: ServerConfig {
                port: 8080,
                interface: "0.0.0.0".to_string(),
                name: "Kiosk Sync Server".to_string(),
            },
            media: MediaConfig {
                directory: data_dir.join("media"),
                supported_extensions: default_media_extensions(),
                default_duration_ms: default_duration_ms(),
            },
            sync: SyncConfig {
                source_dir: data_dir.join("source"),
                poll_interval_seconds: default_poll_interval(),
                watch_source: true,
                manifest_name: default_manifest_name(),
            },
            power: PowerConfig::default(),
            distribution: DistributionConfig::default(),
        }
    }

    /// Location of `config.toml` in the platform config directory
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kiosk-sync")
            .join("config.toml")
    }

    /// Load configuration from file or create it with defaults
    pub fn load_or_create<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        if config_path.exists() {
            Self::load_from_file(config_path)
        } else {
            let default_config = Self::default_for_platform();
            default_config
                .save_to_file(config_path)
                .with_context(|| format!("Failed to create default configuration file at: {}", config_path.display()))?;

            tracing::info!("Created default configuration file at: {}", config_path.display());
            Ok(default_config)
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config: AppConfig = read_toml(config_path.as_ref())?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Save configuration to a TOML file with a commented header
    pub fn save_to_file<P: AsRef<Path>>(&self, config_path: P) -> Result<()> {
        let body = toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        let mut content = String::from("# Kiosk Sync Server Configuration\n# Auto-generated with default values\n\n");
        for line in body.lines() {
            if line.starts_with("[server]") {
                content.push_str("# HTTP and WebSocket listener\n");
            } else if line.starts_with("[media]") {
                content.push_str("\n# Canonical media directory served to displays\n");
            } else if line.starts_with("[sync]") {
                content.push_str("\n# Remote source folder and polling cadence\n");
                content.push_str("# An optional manifest in the source folder fixes the display order\n");
            } else if line.starts_with("[power]") {
                content.push_str("\n# Background services pause after this many idle seconds\n");
            } else if line.starts_with("[distribution]") {
                content.push_str("\n# Push channel liveness probing and per-client queue size\n");
            }
            content.push_str(line);
            content.push('\n');
        }

        write_text(config_path.as_ref(), &content)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::default_for_platform()
    }
}

/// Extensions the synchronizer mirrors by default
pub fn default_media_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg", "mp4", "webm", "mov", "m4v"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

pub(crate) fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    toml::from_str(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

pub(crate) fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    std::fs::write(path, content).with_context(|| format!("Failed to write config file: {}", path.display()))
}
