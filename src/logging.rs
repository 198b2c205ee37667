use anyhow::{anyhow, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{AppConfig, ClientConfig};

/// Initialize logging. `RUST_LOG` wins over `log_level`, which wins over the
/// debug flag.
pub fn init_logging_with_options(log_level: Option<&str>, debug: bool) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.unwrap_or(default_level)))
        .map_err(|e| anyhow!("Invalid log level: {}", e))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(debug)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("Logging already initialized: {}", e))?;

    info!("Logging initialized with level: {}", log_level.unwrap_or(default_level));
    Ok(())
}

/// Log the effective server configuration
pub fn log_server_configuration(config_path: &Path, config: &AppConfig) {
    info!("=== Kiosk Sync Server Configuration ===");
    info!("Configuration file: {}", config_path.display());
    info!("Listening on: {}:{}", config.server.interface, config.server.port);
    info!("Server name: {}", config.server.name);
    info!("Media directory: {}", config.media.directory.display());
    info!("Supported extensions: {:?}", config.media.supported_extensions);
    info!("Default display time: {}ms", config.media.default_duration_ms);
    info!("Remote source: {}", config.sync.source_dir.display());
    info!(
        "Sync: every {}s, source watching {}",
        config.sync.poll_interval_seconds,
        if config.sync.watch_source { "enabled" } else { "disabled" }
    );
    info!("Power: pause after {}s without client activity", config.power.inactivity_timeout_seconds);
    info!(
        "Distribution: liveness probe every {}s, {} queued frames per client",
        config.distribution.liveness_interval_seconds, config.distribution.outbound_queue_capacity
    );

    if !config.sync.source_dir.is_dir() {
        warn!(
            "Remote source {} is not reachable yet - the server will report unavailable until the first sync",
            config.sync.source_dir.display()
        );
    }
}

/// Log the effective display client configuration
pub fn log_client_configuration(config_path: &Path, config: &ClientConfig) {
    info!("=== Kiosk Display Client Configuration ===");
    info!("Configuration file: {}", config_path.display());
    info!("Server: {}", config.server.base_url);
    info!("Push channel: {}", config.server.ws_url());
    info!(
        "Reconnect: {:?}, {} attempts every {}ms",
        config.reconnect.strategy, config.reconnect.max_attempts, config.reconnect.interval_ms
    );
    info!("Status poll: every {}ms", config.status.poll_interval_ms);
    info!(
        "Cache: {} (namespace {}, ttl {}s)",
        config.cache.directory.display(),
        config.cache.namespace,
        config.cache.ttl_seconds
    );
    match (&config.schedule.start, &config.schedule.end) {
        (Some(start), Some(end)) => info!("Active window: {} - {}", start, end),
        _ => info!("Active window: always"),
    }
}

/// Log shutdown information
pub fn log_shutdown_info(graceful: bool, uptime: Duration) {
    info!("=== Shutting Down ===");

    let shutdown_type = if graceful { "Graceful" } else { "Forced" };
    info!("Shutdown type: {}", shutdown_type);

    let uptime_seconds = uptime.as_secs();
    info!("Total uptime: {}h {}m", uptime_seconds / 3600, (uptime_seconds % 3600) / 60);

    if !graceful {
        warn!("Forced shutdown - background tasks may not have stopped cleanly");
    }

    info!("=== Shutdown Complete ===");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_initialization_reports_error() {
        // Another test may have installed a subscriber first; either way the
        // second call must not panic.
        let _ = init_logging_with_options(Some("debug"), false);
        assert!(init_logging_with_options(Some("info"), false).is_err());
    }

    #[test]
    fn test_status_blocks_do_not_panic() {
        let config = AppConfig::default_for_platform();
        log_server_configuration(Path::new("config.toml"), &config);
        log_client_configuration(Path::new("client.toml"), &ClientConfig::default());
        log_shutdown_info(true, Duration::from_secs(3_725));
    }
}
