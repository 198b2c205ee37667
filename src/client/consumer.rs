use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, interval_at, sleep_until, timeout, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::connection::{ConnectionState, LinkStatus};
use super::fetch::CachedFetcher;
use super::transport::{InboundFrame, PushConnection, PushTransport, StatusProbe};
use crate::config::client::{ClientConfig, ReconnectConfig};
use crate::error::{ConsumerStopped, TransportError};
use crate::media::MediaItem;
use crate::playlist::Direction;
use crate::protocol::{ClientMessage, ServerMessage};

/// Cache key for the last known playlist
pub const PLAYLIST_CACHE_KEY: &str = "playlist";

/// Timing and retry knobs for the consumer
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub reconnect: ReconnectConfig,
    pub ping_interval: Duration,
    pub status_poll_interval: Duration,
    pub media_path: String,
}

impl ConsumerSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            reconnect: config.reconnect.clone(),
            ping_interval: Duration::from_secs(config.liveness.ping_interval_seconds),
            status_poll_interval: Duration::from_millis(config.status.poll_interval_ms),
            media_path: config.server.media_path.clone(),
        }
    }
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

/// What the display renders from
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerView {
    pub media: Vec<MediaItem>,
    pub index: usize,
    pub version: u64,
    pub loading: bool,
    pub server_ready: bool,
    pub server_connected: bool,
    pub status: LinkStatus,
    pub connection: ConnectionState,
    /// Showing media without a live push channel
    pub offline: bool,
    pub reloads: u32,
}

impl Default for ConsumerView {
    fn default() -> Self {
        Self {
            media: Vec::new(),
            index: 0,
            version: 0,
            loading: true,
            server_ready: false,
            server_connected: false,
            status: LinkStatus::Disconnected,
            connection: ConnectionState::default(),
            offline: false,
            reloads: 0,
        }
    }
}

impl ConsumerView {
    pub fn current(&self) -> Option<&MediaItem> {
        self.media.get(self.index)
    }

    pub fn total(&self) -> usize {
        self.media.len()
    }
}

enum ConsumerCommand {
    Connect { ack: oneshot::Sender<()> },
    Disconnect { ack: oneshot::Sender<()> },
    Navigate {
        direction: Direction,
        reply: oneshot::Sender<Option<MediaItem>>,
    },
    SetActive { active: bool, ack: oneshot::Sender<()> },
    Shutdown { ack: oneshot::Sender<()> },
}

/// Display-side playlist consumer. A single task owns the connection, the
/// retry state and the local view; everything else talks to it through a
/// [`ConsumerHandle`].
pub struct MediaConsumer {
    settings: ConsumerSettings,
    transport: Arc<dyn PushTransport>,
    probe: Option<Arc<dyn StatusProbe>>,
    fetcher: Option<CachedFetcher>,
    backoff: Backoff,
    owners: usize,
    active: bool,
    server_reachable: bool,
    link: Option<PushConnection>,
    reconnect_at: Option<Instant>,
    received_snapshot: bool,
    status_poll: Interval,
    view: ConsumerView,
    view_tx: watch::Sender<ConsumerView>,
    commands: mpsc::UnboundedReceiver<ConsumerCommand>,
}

impl MediaConsumer {
    /// Start the consumer task. Without a probe the server is assumed
    /// reachable; without a fetcher there is no offline bootstrap.
    pub fn spawn(
        settings: ConsumerSettings,
        transport: Arc<dyn PushTransport>,
        probe: Option<Arc<dyn StatusProbe>>,
        fetcher: Option<CachedFetcher>,
    ) -> ConsumerHandle {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ConsumerView::default());
        let mut status_poll = interval(settings.status_poll_interval);
        status_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let consumer = Self {
            backoff: Backoff::from_config(&settings.reconnect),
            server_reachable: probe.is_none(),
            settings,
            transport,
            probe,
            fetcher,
            owners: 0,
            active: true,
            link: None,
            reconnect_at: None,
            received_snapshot: false,
            status_poll,
            view: ConsumerView::default(),
            view_tx,
            commands,
        };
        tokio::spawn(consumer.run());

        ConsumerHandle {
            commands: command_tx,
            view: view_rx,
        }
    }

    async fn run(mut self) {
        self.bootstrap().await;

        let mut ping = interval_at(Instant::now() + self.settings.ping_interval, self.settings.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let has_probe = self.probe.is_some();

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle(command).await {
                        break;
                    }
                }
                frame = next_frame(&mut self.link) => self.on_frame(frame).await,
                _ = sleep_until_deadline(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.try_connect().await;
                }
                _ = ping.tick(), if self.link.is_some() => {
                    if let Some(link) = &self.link {
                        link.send(ClientMessage::Ping);
                    }
                }
                _ = self.status_poll.tick(), if has_probe && self.active => self.check_server().await,
            }
        }

        self.teardown();
        debug!("Media consumer stopped");
    }

    /// Seed the view from the cached playlist, or a live fetch if the cache is cold
    async fn bootstrap(&mut self) {
        let Some(fetcher) = &self.fetcher else { return };
        match fetcher
            .get_json::<Vec<MediaItem>>(&self.settings.media_path, PLAYLIST_CACHE_KEY)
            .await
        {
            Ok(media) => {
                info!("Bootstrapped {} media items", media.len());
                self.view.media = media;
                self.view.loading = false;
            }
            Err(e) => debug!("No playlist available for bootstrap: {}", e),
        }
        self.publish();
    }

    /// Returns false when the task should exit
    async fn handle(&mut self, command: ConsumerCommand) -> bool {
        match command {
            ConsumerCommand::Connect { ack } => {
                self.owners += 1;
                if self.link.is_none() {
                    self.backoff.reset();
                    self.reconnect_at = None;
                    self.try_connect().await;
                }
                let _ = ack.send(());
            }
            ConsumerCommand::Disconnect { ack } => {
                self.owners = self.owners.saturating_sub(1);
                if self.owners == 0 {
                    debug!("Last owner released the push channel");
                    self.teardown();
                }
                let _ = ack.send(());
            }
            ConsumerCommand::Navigate { direction, reply } => {
                let _ = reply.send(self.navigate(direction));
            }
            ConsumerCommand::SetActive { active, ack } => {
                if active != self.active {
                    self.active = active;
                    if active {
                        info!("Active window opened");
                        if self.probe.is_some() {
                            self.status_poll.reset();
                            self.check_server().await;
                        } else {
                            self.try_connect().await;
                        }
                    } else {
                        info!("Active window closed");
                        self.teardown();
                        // no status polls until the window reopens
                        if self.probe.is_some() {
                            self.server_reachable = false;
                            self.view.server_connected = false;
                            self.publish();
                        }
                    }
                }
                let _ = ack.send(());
            }
            ConsumerCommand::Shutdown { ack } => {
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    fn should_run(&self) -> bool {
        self.owners > 0 && self.active && self.server_reachable
    }

    async fn try_connect(&mut self) {
        if !self.should_run() || self.link.is_some() {
            return;
        }

        self.view.status = LinkStatus::Connecting;
        self.publish();

        let connect_timeout = self.settings.reconnect.connect_timeout();
        let result = match timeout(connect_timeout, self.transport.connect()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(connect_timeout)),
        };

        match result {
            Ok(link) => {
                info!("Push channel connected");
                self.link = Some(link);
                self.backoff.reset();
                self.reconnect_at = None;
                self.view.version = 0;
                self.view.status = LinkStatus::Connected;
                if self.view.connection.on_connected() {
                    self.reload();
                }
                self.publish();
            }
            Err(e) => {
                warn!("Push channel connection failed: {}", e);
                self.view.status = LinkStatus::Error;
                self.publish();
                self.view.status = LinkStatus::Disconnected;
                self.publish();
                self.schedule_reconnect();
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        if !self.should_run() {
            return;
        }
        match self.backoff.next() {
            Some(delay) => {
                debug!("Reconnect attempt {} in {:?}", self.backoff.attempts(), delay);
                self.reconnect_at = Some(Instant::now() + delay);
            }
            None => {
                warn!(
                    "Giving up after {} reconnect attempts; waiting for an explicit connect",
                    self.backoff.attempts()
                );
                self.reconnect_at = None;
            }
        }
    }

    /// Deliberate close: drop the link and forget pending retries
    fn teardown(&mut self) {
        self.link = None;
        self.reconnect_at = None;
        self.backoff.reset();
        if self.view.status != LinkStatus::Disconnected {
            self.view.connection.on_teardown();
            self.view.status = LinkStatus::Disconnected;
            self.publish();
        }
    }

    /// Reconnect after a lost session: start over rather than reconcile
    fn reload(&mut self) {
        warn!("Reconnected after losing the push channel, reloading");
        self.view.media.clear();
        self.view.index = 0;
        self.view.loading = true;
        self.view.reloads += 1;
        self.received_snapshot = false;
    }

    async fn on_frame(&mut self, frame: InboundFrame) {
        match frame {
            InboundFrame::Text(text) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(ServerMessage::MediaList { media, version }) | Ok(ServerMessage::MediaUpdate { media, version }) => {
                    self.apply_snapshot(media, version).await
                }
                Ok(ServerMessage::Ping) => {
                    if let Some(link) = &self.link {
                        link.send(ClientMessage::Pong);
                    }
                }
                Ok(ServerMessage::Pong) => debug!("Pong received"),
                Ok(ServerMessage::Unknown) => debug!("Ignoring unknown message type"),
                Err(e) => debug!("Unparseable push frame: {}", e),
            },
            InboundFrame::Closed => self.on_lost(LinkStatus::Disconnected, "closed by server"),
            InboundFrame::Failed(e) => self.on_lost(LinkStatus::Error, &e.to_string()),
        }
    }

    fn on_lost(&mut self, status: LinkStatus, reason: &str) {
        warn!("Push channel lost: {}", reason);
        self.link = None;
        self.view.connection.on_disconnected();
        if status == LinkStatus::Error {
            self.view.status = LinkStatus::Error;
            self.publish();
        }
        self.view.status = LinkStatus::Disconnected;
        self.publish();
        self.schedule_reconnect();
    }

    async fn apply_snapshot(&mut self, media: Vec<MediaItem>, version: u64) {
        if version != 0 && version < self.view.version {
            debug!("Ignoring stale snapshot {} (have {})", version, self.view.version);
            return;
        }

        if self.view.index >= media.len() {
            self.view.index = 0;
        }
        debug!("Snapshot {} with {} items", version, media.len());
        if let Some(fetcher) = &self.fetcher {
            if let Err(e) = fetcher.cache().write(PLAYLIST_CACHE_KEY, &media).await {
                warn!("Failed to cache playlist: {}", e);
            }
        }

        self.view.media = media;
        self.view.version = version;
        self.view.loading = false;
        self.received_snapshot = true;
        self.publish();
    }

    fn navigate(&mut self, direction: Direction) -> Option<MediaItem> {
        let len = self.view.media.len();
        if len == 0 {
            return None;
        }
        self.view.index = direction.step(self.view.index, len);
        self.publish();
        self.view.current().cloned()
    }

    async fn check_server(&mut self) {
        let Some(probe) = &self.probe else { return };
        let reachable = match probe.check().await {
            Ok(()) => true,
            Err(e) => {
                debug!("Server status probe failed: {}", e);
                false
            }
        };

        if reachable == self.server_reachable {
            return;
        }
        self.server_reachable = reachable;
        self.view.server_connected = reachable;
        self.publish();

        if reachable {
            info!("Server reachable again");
            self.try_connect().await;
        } else {
            warn!("Server unreachable, closing push channel");
            if self.link.take().is_some() {
                self.view.connection.on_disconnected();
            }
            self.reconnect_at = None;
            self.backoff.reset();
            self.view.status = LinkStatus::Disconnected;
            self.publish();
        }
    }

    fn publish(&mut self) {
        self.view.server_ready = self.received_snapshot || !self.view.media.is_empty();
        self.view.offline = self.view.status != LinkStatus::Connected && !self.view.media.is_empty();
        if self.probe.is_none() {
            self.view.server_connected = self.server_reachable;
        }
        let view = &self.view;
        self.view_tx.send_if_modified(|current| {
            if current == view {
                false
            } else {
                *current = view.clone();
                true
            }
        });
    }
}

async fn next_frame(link: &mut Option<PushConnection>) -> InboundFrame {
    match link {
        Some(link) => link.inbound.recv().await.unwrap_or(InboundFrame::Closed),
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Cloneable access to a [`MediaConsumer`]
#[derive(Clone)]
pub struct ConsumerHandle {
    commands: mpsc::UnboundedSender<ConsumerCommand>,
    view: watch::Receiver<ConsumerView>,
}

impl ConsumerHandle {
    /// Register an owner. The first owner (or any call while no link is up)
    /// resets the retry budget and connects.
    pub async fn connect(&self) -> Result<(), ConsumerStopped> {
        let (ack, rx) = oneshot::channel();
        self.commands
            .send(ConsumerCommand::Connect { ack })
            .map_err(|_| ConsumerStopped)?;
        rx.await.map_err(|_| ConsumerStopped)
    }

    /// Release an owner; the last one closes the link
    pub async fn disconnect(&self) -> Result<(), ConsumerStopped> {
        let (ack, rx) = oneshot::channel();
        self.commands
            .send(ConsumerCommand::Disconnect { ack })
            .map_err(|_| ConsumerStopped)?;
        rx.await.map_err(|_| ConsumerStopped)
    }

    /// Move the local cursor. Never sent to the server.
    pub async fn navigate(&self, direction: Direction) -> Result<Option<MediaItem>, ConsumerStopped> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(ConsumerCommand::Navigate { direction, reply })
            .map_err(|_| ConsumerStopped)?;
        rx.await.map_err(|_| ConsumerStopped)
    }

    /// Open or close the activity gate
    pub async fn set_active(&self, active: bool) -> Result<(), ConsumerStopped> {
        let (ack, rx) = oneshot::channel();
        self.commands
            .send(ConsumerCommand::SetActive { active, ack })
            .map_err(|_| ConsumerStopped)?;
        rx.await.map_err(|_| ConsumerStopped)
    }

    pub fn view(&self) -> ConsumerView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConsumerView> {
        self.view.clone()
    }

    pub async fn shutdown(&self) {
        let (ack, rx) = oneshot::channel();
        if self.commands.send(ConsumerCommand::Shutdown { ack }).is_ok() {
            let _ = rx.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::cache::CacheStore;
    use crate::client::transport::JsonFetcher;
    use crate::config::client::ReconnectStrategy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    struct FakeLink {
        server_tx: mpsc::Sender<InboundFrame>,
        client_rx: mpsc::UnboundedReceiver<ClientMessage>,
    }

    #[derive(Default)]
    struct FakeTransport {
        refuse: AtomicBool,
        attempts: AtomicU32,
        links: Mutex<Vec<FakeLink>>,
    }

    impl FakeTransport {
        fn refusing() -> Self {
            let transport = Self::default();
            transport.refuse.store(true, Ordering::SeqCst);
            transport
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }

        fn latest(&self) -> (mpsc::Sender<InboundFrame>, usize) {
            let links = self.links.lock().unwrap();
            (links.last().unwrap().server_tx.clone(), links.len())
        }

        async fn push(&self, json: &str) {
            let (tx, _) = self.latest();
            tx.send(InboundFrame::Text(json.to_string())).await.unwrap();
        }

        fn take_link(&self) -> FakeLink {
            self.links.lock().unwrap().pop().unwrap()
        }
    }

    #[async_trait]
    impl PushTransport for FakeTransport {
        async fn connect(&self) -> Result<PushConnection, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.refuse.load(Ordering::SeqCst) {
                return Err(TransportError::Connect("connection refused".into()));
            }
            let (server_tx, inbound) = mpsc::channel(16);
            let (outbound, client_rx) = mpsc::unbounded_channel();
            self.links.lock().unwrap().push(FakeLink { server_tx, client_rx });
            Ok(PushConnection::new(inbound, outbound, CancellationToken::new()))
        }
    }

    struct FakeProbe {
        up: AtomicBool,
        checks: AtomicU32,
    }

    #[async_trait]
    impl StatusProbe for FakeProbe {
        async fn check(&self) -> Result<(), TransportError> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(TransportError::Status(503))
            }
        }
    }

    struct OfflineFetcher;

    #[async_trait]
    impl JsonFetcher for OfflineFetcher {
        async fn fetch_json(&self, _path: &str) -> Result<serde_json::Value, TransportError> {
            Err(TransportError::Connect("offline".into()))
        }
    }

    fn settings(max_attempts: u32) -> ConsumerSettings {
        ConsumerSettings {
            reconnect: ReconnectConfig {
                strategy: ReconnectStrategy::Fixed,
                max_attempts,
                interval_ms: 5_000,
                ..Default::default()
            },
            ping_interval: Duration::from_secs(30),
            status_poll_interval: Duration::from_secs(10),
            media_path: "/api/all-media".to_string(),
        }
    }

    fn list(kind: &str, names: &[&str], version: u64) -> String {
        let media: Vec<MediaItem> = names.iter().map(|n| MediaItem::from_file_name(n)).collect();
        serde_json::json!({"type": kind, "media": media, "version": version}).to_string()
    }

    async fn wait_for(handle: &ConsumerHandle, predicate: impl FnMut(&ConsumerView) -> bool) -> ConsumerView {
        let mut rx = handle.subscribe();
        let view = rx.wait_for(predicate).await.unwrap().clone();
        view
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_replaces_media_and_resets_out_of_range_index() {
        let transport = Arc::new(FakeTransport::default());
        let consumer = MediaConsumer::spawn(settings(5), transport.clone(), None, None);
        assert!(consumer.view().loading);

        consumer.connect().await.unwrap();
        assert_eq!(consumer.view().status, LinkStatus::Connected);

        transport.push(&list("mediaList", &["a.jpg", "b.jpg", "c.jpg"], 1)).await;
        let view = wait_for(&consumer, |v| v.total() == 3).await;
        assert_eq!(view.index, 0);
        assert!(!view.loading);
        assert!(view.server_ready);

        consumer.navigate(Direction::Next).await.unwrap();
        let item = consumer.navigate(Direction::Next).await.unwrap().unwrap();
        assert_eq!(item.id, "c.jpg");

        transport.push(&list("mediaUpdate", &["a.jpg", "d.jpg"], 2)).await;
        let view = wait_for(&consumer, |v| v.version == 2).await;
        assert_eq!(view.index, 0);
        assert_eq!(view.current().unwrap().id, "a.jpg");

        // an older version arriving late is ignored
        transport.push(&list("mediaUpdate", &["z.jpg"], 1)).await;
        transport.push(r#"{"type":"weather"}"#).await;
        consumer.navigate(Direction::Previous).await.unwrap();
        let view = consumer.view();
        assert_eq!(view.total(), 2);
        assert_eq!(view.index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_attempts_are_bounded() {
        let transport = Arc::new(FakeTransport::refusing());
        let consumer = MediaConsumer::spawn(settings(3), transport.clone(), None, None);

        consumer.connect().await.unwrap();
        assert_eq!(transport.attempts(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.attempts(), 4);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(transport.attempts(), 4);
        assert_eq!(consumer.view().status, LinkStatus::Disconnected);

        // an explicit connect starts a fresh budget
        consumer.connect().await.unwrap();
        assert_eq!(transport.attempts(), 5);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.attempts(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_after_loss_reloads_once() {
        let transport = Arc::new(FakeTransport::default());
        let consumer = MediaConsumer::spawn(settings(5), transport.clone(), None, None);

        consumer.connect().await.unwrap();
        transport.push(&list("mediaList", &["a.jpg", "b.jpg"], 1)).await;
        wait_for(&consumer, |v| v.total() == 2).await;
        consumer.navigate(Direction::Next).await.unwrap();

        let (server_tx, _) = transport.latest();
        server_tx.send(InboundFrame::Closed).await.unwrap();
        let view = wait_for(&consumer, |v| v.status == LinkStatus::Disconnected).await;
        assert!(view.connection.has_lost_connection);
        assert!(view.offline);

        let view = wait_for(&consumer, |v| v.status == LinkStatus::Connected).await;
        assert_eq!(view.reloads, 1);
        assert!(view.media.is_empty());
        assert!(view.loading);
        assert_eq!(view.index, 0);
        assert!(!view.connection.has_lost_connection);
        assert!(view.connection.was_ever_connected);
        assert_eq!(transport.attempts(), 2);

        transport.push(&list("mediaList", &["a.jpg", "b.jpg"], 1)).await;
        let view = wait_for(&consumer, |v| v.total() == 2).await;
        assert_eq!(view.reloads, 1);
        assert!(!view.offline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_before_first_connect_do_not_reload() {
        let transport = Arc::new(FakeTransport::refusing());
        let consumer = MediaConsumer::spawn(settings(5), transport.clone(), None, None);

        consumer.connect().await.unwrap();
        assert!(!consumer.view().connection.has_lost_connection);

        transport.refuse.store(false, Ordering::SeqCst);
        let view = wait_for(&consumer, |v| v.status == LinkStatus::Connected).await;
        assert_eq!(view.reloads, 0);
        assert_eq!(transport.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_is_shared_by_owners() {
        let transport = Arc::new(FakeTransport::default());
        let consumer = MediaConsumer::spawn(settings(5), transport.clone(), None, None);

        consumer.connect().await.unwrap();
        consumer.connect().await.unwrap();
        assert_eq!(transport.attempts(), 1);

        consumer.disconnect().await.unwrap();
        assert_eq!(consumer.view().status, LinkStatus::Connected);

        consumer.disconnect().await.unwrap();
        let view = consumer.view();
        assert_eq!(view.status, LinkStatus::Disconnected);
        assert!(!view.connection.has_lost_connection);

        let mut link = transport.take_link();
        assert!(link.client_rx.recv().await.is_none(), "link must be closed");

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_both_directions() {
        let transport = Arc::new(FakeTransport::default());
        let consumer = MediaConsumer::spawn(settings(5), transport.clone(), None, None);
        consumer.connect().await.unwrap();

        transport.push(r#"{"type":"ping"}"#).await;
        let mut link = transport.take_link();
        assert_eq!(link.client_rx.recv().await, Some(ClientMessage::Pong));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(link.client_rx.recv().await, Some(ClientMessage::Ping));
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_gate_controls_connection() {
        let transport = Arc::new(FakeTransport::default());
        let consumer = MediaConsumer::spawn(settings(5), transport.clone(), None, None);

        consumer.set_active(false).await.unwrap();
        consumer.connect().await.unwrap();
        assert_eq!(transport.attempts(), 0);

        consumer.set_active(true).await.unwrap();
        assert_eq!(transport.attempts(), 1);
        assert_eq!(consumer.view().status, LinkStatus::Connected);

        consumer.set_active(false).await.unwrap();
        let view = consumer.view();
        assert_eq!(view.status, LinkStatus::Disconnected);
        assert!(!view.connection.has_lost_connection);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_window_stops_status_polling() {
        let transport = Arc::new(FakeTransport::default());
        let probe = Arc::new(FakeProbe {
            up: AtomicBool::new(true),
            checks: AtomicU32::new(0),
        });
        let consumer = MediaConsumer::spawn(settings(5), transport.clone(), Some(probe.clone()), None);

        consumer.set_active(false).await.unwrap();
        consumer.connect().await.unwrap();
        let view = consumer.view();
        assert!(!view.server_connected);
        assert_eq!(view.status, LinkStatus::Disconnected);

        let before = probe.checks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(probe.checks.load(Ordering::SeqCst), before);
        assert_eq!(transport.attempts(), 0);

        // reopening checks the server right away instead of waiting a poll period
        consumer.set_active(true).await.unwrap();
        assert_eq!(probe.checks.load(Ordering::SeqCst), before + 1);
        let view = consumer.view();
        assert!(view.server_connected);
        assert_eq!(view.status, LinkStatus::Connected);
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_probe_gates_connection() {
        let transport = Arc::new(FakeTransport::default());
        let probe = Arc::new(FakeProbe {
            up: AtomicBool::new(false),
            checks: AtomicU32::new(0),
        });
        let consumer = MediaConsumer::spawn(settings(5), transport.clone(), Some(probe.clone()), None);

        consumer.connect().await.unwrap();
        assert_eq!(transport.attempts(), 0);
        assert!(!consumer.view().server_connected);

        probe.up.store(true, Ordering::SeqCst);
        let view = wait_for(&consumer, |v| v.status == LinkStatus::Connected).await;
        assert!(view.server_connected);
        assert_eq!(transport.attempts(), 1);

        probe.up.store(false, Ordering::SeqCst);
        let view = wait_for(&consumer, |v| !v.server_connected).await;
        assert_eq!(view.status, LinkStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_playlist_bootstrap_and_write_through() {
        let dir = TempDir::new().unwrap();
        let cache = CacheStore::new(dir.path(), "dynamicView", Duration::from_secs(1800));
        let cached = vec![MediaItem::from_file_name("x.jpg"), MediaItem::from_file_name("y.jpg")];
        cache.write(PLAYLIST_CACHE_KEY, &cached).await.unwrap();

        let transport = Arc::new(FakeTransport::refusing());
        let fetcher = CachedFetcher::new(Arc::new(OfflineFetcher), cache.clone());
        let consumer = MediaConsumer::spawn(settings(1), transport.clone(), None, Some(fetcher));

        let view = wait_for(&consumer, |v| v.total() == 2).await;
        assert_eq!(view.media, cached);
        assert!(!view.loading);
        assert!(view.offline);
        assert!(view.server_ready);

        transport.refuse.store(false, Ordering::SeqCst);
        consumer.connect().await.unwrap();
        transport.push(&list("mediaList", &["a.jpg"], 4)).await;
        let view = wait_for(&consumer, |v| v.version == 4).await;
        assert!(!view.offline);

        let stored: Vec<MediaItem> = cache.read(PLAYLIST_CACHE_KEY).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "a.jpg");
    }
}
