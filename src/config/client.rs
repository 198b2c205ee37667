use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::validation::ConfigValidator;
use super::{read_toml, write_text};

/// Display client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: RemoteServerConfig,
    pub reconnect: ReconnectConfig,
    pub liveness: LivenessConfig,
    pub status: StatusConfig,
    pub cache: CacheConfig,
    pub slideshow: SlideshowConfig,
    pub schedule: ScheduleConfig,
}

/// Where the sync server lives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteServerConfig {
    pub base_url: String,
    pub ws_path: String,
    pub status_path: String,
    pub media_path: String,
}

/// Delay policy between connection attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectStrategy {
    /// `interval_ms` between attempts, at most `max_attempts` in a row
    Fixed,
    /// `initial_delay_ms` growing by `multiplier` up to `max_delay_ms`, unbounded
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub strategy: ReconnectStrategy,
    pub max_attempts: u32,
    pub interval_ms: u64,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub ping_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub directory: PathBuf,
    pub namespace: String,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlideshowConfig {
    pub default_duration_ms: u64,
}

/// Optional daily window (`HH:MM`) during which the display is active.
/// Both bounds absent means always active.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl Default for RemoteServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            ws_path: "/ws".to_string(),
            status_path: "/api/server-status".to_string(),
            media_path: "/api/all-media".to_string(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            strategy: ReconnectStrategy::Fixed,
            max_attempts: 5,
            interval_ms: 5_000,
            initial_delay_ms: 1_000,
            multiplier: 1.5,
            max_delay_ms: 30_000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ping_interval_seconds: 30,
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 30_000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("kiosk-sync"),
            namespace: "dynamicView".to_string(),
            ttl_seconds: 1_800,
        }
    }
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self {
            default_duration_ms: 10_000,
        }
    }
}

impl RemoteServerConfig {
    /// Push channel URL, with the scheme switched from http(s) to ws(s)
    pub fn ws_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}{}", base, self.ws_path)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl SlideshowConfig {
    pub fn default_duration(&self) -> Duration {
        Duration::from_millis(self.default_duration_ms)
    }
}

impl ReconnectConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl ClientConfig {
    /// Location of `client.toml` in the platform config directory
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kiosk-sync")
            .join("client.toml")
    }

    pub fn load_or_create<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        if config_path.exists() {
            Self::load_from_file(config_path)
        } else {
            let config = Self::default();
            config
                .save_to_file(config_path)
                .with_context(|| format!("Failed to create default client configuration at: {}", config_path.display()))?;

            tracing::info!("Created default client configuration at: {}", config_path.display());
            Ok(config)
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config: ClientConfig = read_toml(config_path.as_ref())?;
        ConfigValidator::validate_client(&config)?;
        Ok(config)
    }

    /// Apply command line overrides and re-check the result
    pub fn apply_overrides(&mut self, base_url: Option<String>) -> Result<()> {
        if let Some(base_url) = base_url {
            self.server.base_url = base_url;
        }
        ConfigValidator::validate_client(self).context("Invalid configuration after command line overrides")
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, config_path: P) -> Result<()> {
        let body = toml::to_string_pretty(self).context("Failed to serialize client configuration to TOML")?;
        let content = format!(
            "# Kiosk Display Client Configuration\n\
             # reconnect.strategy is \"fixed\" (bounded attempts) or \"exponential\"\n\
             # schedule.start / schedule.end take HH:MM and may wrap past midnight\n\n{}",
            body
        );
        write_text(config_path.as_ref(), &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_client_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.reconnect.strategy, ReconnectStrategy::Fixed);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.interval_ms, 5_000);
        assert_eq!(config.reconnect.max_delay_ms, 30_000);
        assert_eq!(config.liveness.ping_interval_seconds, 30);
        assert_eq!(config.cache.ttl_seconds, 1_800);
        assert!(config.schedule.start.is_none());
    }

    #[test]
    fn test_ws_url_switches_scheme() {
        let mut server = RemoteServerConfig::default();
        assert_eq!(server.ws_url(), "ws://127.0.0.1:8080/ws");

        server.base_url = "https://kiosk.example.org/".to_string();
        assert_eq!(server.ws_url(), "wss://kiosk.example.org/ws");
        assert_eq!(server.http_url("/api/all-media"), "https://kiosk.example.org/api/all-media");
    }

    #[test]
    fn test_base_url_override_is_validated() {
        let mut config = ClientConfig::default();
        assert!(config.apply_overrides(Some("127.0.0.1:8080".to_string())).is_err());

        let mut config = ClientConfig::default();
        config.apply_overrides(Some("https://kiosk.example.org".to_string())).unwrap();
        assert_eq!(config.server.ws_url(), "wss://kiosk.example.org/ws");

        let mut config = ClientConfig::default();
        config.apply_overrides(None).unwrap();
        assert_eq!(config.server.base_url, "http://127.0.0.1:8080");
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let config: ClientConfig = toml::from_str(
            r#"
            [reconnect]
            strategy = "exponential"

            [schedule]
            start = "07:30"
            end = "22:00"
            "#,
        )?;
        assert_eq!(config.reconnect.strategy, ReconnectStrategy::Exponential);
        assert_eq!(config.reconnect.initial_delay_ms, 1_000);
        assert_eq!(config.schedule.start.as_deref(), Some("07:30"));
        assert_eq!(config.server.ws_path, "/ws");
        Ok(())
    }

    #[test]
    fn test_client_config_round_trips_through_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("client.toml");

        let created = ClientConfig::load_or_create(&path)?;
        let loaded = ClientConfig::load_from_file(&path)?;
        assert_eq!(created.server.base_url, loaded.server.base_url);
        assert_eq!(created.cache.namespace, loaded.cache.namespace);
        Ok(())
    }
}
