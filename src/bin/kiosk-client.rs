use anyhow::Context;
use clap::Parser;
use std::{path::PathBuf, sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use kiosk_sync::{
    client::{
        schedule::{run_schedule_gate, ActiveWindow},
        slideshow::run_slideshow,
        CacheStore, CachedFetcher, ConsumerSettings, HttpApi, LinkStatus, MediaConsumer, WsTransport,
    },
    config::ClientConfig,
    logging,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Kiosk display client", long_about = None)]
struct Args {
    /// Path to the client configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the sync server, e.g. http://10.0.0.5:8080
    #[arg(long)]
    base_url: Option<String>,

    /// Log level filter, overridden by RUST_LOG
    #[arg(long)]
    log_level: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let started = Instant::now();
    let args = Args::parse();

    logging::init_logging_with_options(args.log_level.as_deref(), args.debug)?;

    let config_path = args.config.clone().unwrap_or_else(ClientConfig::default_config_path);
    let mut config = ClientConfig::load_or_create(&config_path)
        .with_context(|| format!("Failed to load client configuration from {}", config_path.display()))?;
    config.apply_overrides(args.base_url)?;
    logging::log_client_configuration(&config_path, &config);

    let window = ActiveWindow::from_config(&config.schedule).context("Invalid active window")?;
    let api = Arc::new(
        HttpApi::new(&config.server, config.reconnect.connect_timeout()).context("Failed to build HTTP client")?,
    );
    let transport = Arc::new(WsTransport::new(config.server.ws_url()));
    let fetcher = CachedFetcher::new(api.clone(), CacheStore::from_config(&config.cache));

    let consumer = MediaConsumer::spawn(
        ConsumerSettings::from_config(&config),
        transport,
        Some(api),
        Some(fetcher),
    );

    let cancel = CancellationToken::new();
    tokio::spawn(run_schedule_gate(window, consumer.clone(), cancel.clone()));

    consumer.connect().await.context("Media consumer stopped during startup")?;

    tokio::spawn(run_slideshow(
        consumer.clone(),
        config.slideshow.default_duration(),
        cancel.clone(),
    ));

    let mut views = consumer.subscribe();
    let watch_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut last = (LinkStatus::Disconnected, false);
        loop {
            tokio::select! {
                _ = watch_cancel.cancelled() => break,
                changed = views.changed() => if changed.is_err() { break },
            }
            let view = views.borrow_and_update().clone();
            let state = (view.status, view.offline);
            if state == last {
                continue;
            }
            last = state;
            if view.offline {
                warn!("Offline: showing {} cached items", view.total());
            } else {
                info!("Push channel {:?}, {} items", view.status, view.total());
            }
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");

    cancel.cancel();
    if consumer.disconnect().await.is_err() {
        warn!("Media consumer had already stopped");
    }
    consumer.shutdown().await;
    logging::log_shutdown_info(true, started.elapsed());

    Ok(())
}
