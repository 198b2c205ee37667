use anyhow::Context;
use clap::Parser;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{error, info, warn};

use kiosk_sync::{
    config::{validation::ConfigValidator, AppConfig},
    distribution::{DistributionLayer, DistributionSettings},
    logging,
    playlist::PlaylistManager,
    power::PowerCoordinator,
    state::AppState,
    sync::{MountedDriveSource, Synchronizer},
    watcher::SourceWatcher,
    web,
};

const SOURCE_DEBOUNCE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(author, version, about = "Kiosk media sync server", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Remote source folder (a mounted drive) to mirror
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Canonical media directory served to displays
    #[arg(long)]
    media_dir: Option<PathBuf>,

    /// The network port to listen on
    #[arg(short, long)]
    port: Option<u16>,

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

    let config_path = args.config.clone().unwrap_or_else(AppConfig::default_config_path);
    let mut config = AppConfig::load_or_create(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    if let Some(source_dir) = args.source_dir {
        config.sync.source_dir = source_dir;
    }
    if let Some(media_dir) = args.media_dir {
        config.media.directory = media_dir;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    ConfigValidator::validate(&config).context("Invalid configuration after command line overrides")?;

    logging::log_server_configuration(&config_path, &config);
    let config = Arc::new(config);

    let playlist = PlaylistManager::spawn();
    let distribution = DistributionLayer::initialize(
        DistributionSettings::from_config(&config.distribution),
        playlist.subscribe(),
    );

    let source = MountedDriveSource::new(
        &config.sync.source_dir,
        config.media.supported_extensions.clone(),
        &config.sync.manifest_name,
    );
    let synchronizer = Synchronizer::new(
        Arc::new(source),
        &config.media.directory,
        config.media.supported_extensions.clone(),
        config.sync.poll_interval(),
        playlist.clone(),
    );
    synchronizer.set_default_duration(config.media.default_duration());

    match synchronizer.initialize().await {
        Ok(report) => info!("Initial sync published {} media items", report.items),
        Err(e) => error!("Initial sync failed: {} - server status stays unavailable until a sync succeeds", e),
    }
    synchronizer.start_sync();

    let _source_watcher = if config.sync.watch_source {
        match SourceWatcher::start(&config.sync.source_dir, synchronizer.clone(), SOURCE_DEBOUNCE) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Source watching disabled, relying on polling: {}", e);
                None
            }
        }
    } else {
        None
    };

    let power = PowerCoordinator::start(config.power.inactivity_timeout());
    power
        .register_service("synchronizer", Arc::new(synchronizer.clone()))
        .await
        .context("Failed to register the synchronizer with the power coordinator")?;

    let app_state = AppState {
        config: config.clone(),
        playlist,
        distribution: distribution.clone(),
        power: power.clone(),
        synchronizer: synchronizer.clone(),
    };
    let app = web::create_router(app_state);

    let ip: IpAddr = config
        .server
        .interface
        .parse()
        .with_context(|| format!("Invalid server interface address: {}", config.server.interface))?;
    let addr = SocketAddr::new(ip, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    synchronizer.stop();
    power.stop().await;
    distribution.shutdown();
    logging::log_shutdown_info(true, started.elapsed());

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
