use anyhow::{anyhow, Context, Result};
use chrono::NaiveTime;
use std::net::IpAddr;

use super::client::ClientConfig;
use super::AppConfig;

/// Configuration validator for ensuring configuration integrity
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the server configuration
    pub fn validate(config: &AppConfig) -> Result<()> {
        Self::validate_server_config(config)?;
        Self::validate_media_config(config)?;
        Self::validate_sync_config(config)?;
        Self::validate_timers(config)?;
        Ok(())
    }

    fn validate_server_config(config: &AppConfig) -> Result<()> {
        if config.server.port == 0 {
            return Err(anyhow!("Server port cannot be 0"));
        }

        if config.server.interface != "0.0.0.0" && config.server.interface != "::" {
            config
                .server
                .interface
                .parse::<IpAddr>()
                .with_context(|| format!("Invalid server interface address: {}", config.server.interface))?;
        }

        if config.server.name.trim().is_empty() {
            return Err(anyhow!("Server name cannot be empty"));
        }

        Ok(())
    }

    fn validate_media_config(config: &AppConfig) -> Result<()> {
        if config.media.directory.as_os_str().is_empty() {
            return Err(anyhow!("Media directory cannot be empty"));
        }

        if config.media.supported_extensions.is_empty() {
            return Err(anyhow!("At least one supported file extension must be configured"));
        }

        for ext in &config.media.supported_extensions {
            if ext.trim().is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(anyhow!("Invalid extension format: {:?}", ext));
            }
        }

        let mut extensions: Vec<String> = config
            .media
            .supported_extensions
            .iter()
            .map(|ext| ext.to_ascii_lowercase())
            .collect();
        extensions.sort();
        extensions.dedup();
        if extensions.len() != config.media.supported_extensions.len() {
            return Err(anyhow!("Duplicate file extensions found in supported_extensions"));
        }

        if config.media.default_duration_ms == 0 {
            return Err(anyhow!("Default display duration must be greater than 0"));
        }

        Ok(())
    }

    fn validate_sync_config(config: &AppConfig) -> Result<()> {
        if config.sync.source_dir.as_os_str().is_empty() {
            return Err(anyhow!("Source directory cannot be empty"));
        }

        if config.sync.source_dir == config.media.directory {
            return Err(anyhow!(
                "Source directory and media directory cannot be the same: {}",
                config.media.directory.display()
            ));
        }

        if config.sync.manifest_name.trim().is_empty() {
            return Err(anyhow!("Manifest file name cannot be empty"));
        }

        Ok(())
    }

    fn validate_timers(config: &AppConfig) -> Result<()> {
        if config.sync.poll_interval_seconds == 0 {
            return Err(anyhow!("Poll interval must be greater than 0 seconds"));
        }

        if config.power.inactivity_timeout_seconds == 0 {
            return Err(anyhow!("Inactivity timeout must be greater than 0 seconds"));
        }

        if config.distribution.liveness_interval_seconds == 0 {
            return Err(anyhow!("Liveness interval must be greater than 0 seconds"));
        }

        if config.distribution.outbound_queue_capacity == 0 {
            return Err(anyhow!("Outbound queue capacity must be greater than 0"));
        }

        Ok(())
    }

    /// Validate the display client configuration
    pub fn validate_client(config: &ClientConfig) -> Result<()> {
        let base = &config.server.base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(anyhow!("Server base_url must start with http:// or https://: {}", base));
        }

        for (name, path) in [
            ("ws_path", &config.server.ws_path),
            ("status_path", &config.server.status_path),
            ("media_path", &config.server.media_path),
        ] {
            if !path.starts_with('/') {
                return Err(anyhow!("{} must start with '/': {}", name, path));
            }
        }

        let reconnect = &config.reconnect;
        if reconnect.interval_ms == 0 || reconnect.initial_delay_ms == 0 || reconnect.max_delay_ms == 0 {
            return Err(anyhow!("Reconnect delays must be greater than 0"));
        }
        if reconnect.multiplier < 1.0 {
            return Err(anyhow!("Reconnect multiplier must be at least 1.0"));
        }
        if reconnect.connect_timeout_ms == 0 {
            return Err(anyhow!("Connect timeout must be greater than 0"));
        }

        if config.liveness.ping_interval_seconds == 0 {
            return Err(anyhow!("Ping interval must be greater than 0 seconds"));
        }

        if config.status.poll_interval_ms == 0 {
            return Err(anyhow!("Status poll interval must be greater than 0"));
        }

        if config.cache.namespace.trim().is_empty() {
            return Err(anyhow!("Cache namespace cannot be empty"));
        }

        if config.slideshow.default_duration_ms == 0 {
            return Err(anyhow!("Default slide duration must be greater than 0"));
        }

        match (&config.schedule.start, &config.schedule.end) {
            (None, None) => {}
            (Some(start), Some(end)) => {
                Self::parse_clock(start).with_context(|| format!("Invalid schedule start: {}", start))?;
                Self::parse_clock(end).with_context(|| format!("Invalid schedule end: {}", end))?;
            }
            _ => return Err(anyhow!("Schedule needs both start and end, or neither")),
        }

        Ok(())
    }

    /// Parse an `HH:MM` wall-clock time
    pub fn parse_clock(value: &str) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|e| anyhow!("expected HH:MM ({})", e))
    }
}
