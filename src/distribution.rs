//! Push channel manager.
//!
//! One task owns the set of live connections. Socket tasks never touch that
//! set directly: they report lifecycle events and inbound messages over a
//! control channel, and receive pre-encoded frames through a bounded per
//! connection queue. Sends into that queue never wait; a connection whose
//! queue is full or closed is purged and will resync when it reconnects.

use axum::extract::ws::Utf8Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::DistributionConfig;
use crate::playlist::PlaylistSnapshot;
use crate::protocol::{encode_ping, encode_pong, encode_snapshot, ClientMessage, SnapshotKind};

pub type ConnectionId = Uuid;

/// Sender half of a connection's outbound frame queue
pub type Outbound = mpsc::Sender<Utf8Bytes>;

/// Lifecycle of a single push connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Error,
    Disconnected,
}

/// Per-client bookkeeping, alive from connect until purge
#[derive(Debug)]
struct ConnectionRecord {
    outbound: Outbound,
    status: ConnectionStatus,
    last_seen: Instant,
    awaiting_pong: bool,
    last_version: Option<u64>,
}

impl ConnectionRecord {
    /// Queue a frame without waiting. Returns false when the connection
    /// can no longer keep up and must be purged.
    fn push(&mut self, id: ConnectionId, frame: Utf8Bytes) -> bool {
        match self.outbound.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Connection {} is not draining its queue, dropping it", id);
                self.status = ConnectionStatus::Error;
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Connection {} outbound queue closed", id);
                self.status = ConnectionStatus::Disconnected;
                false
            }
        }
    }
}

/// Liveness and delivery settings
#[derive(Debug, Clone, Copy)]
pub struct DistributionSettings {
    pub liveness_interval: Duration,
    pub outbound_capacity: usize,
}

impl DistributionSettings {
    pub fn from_config(config: &DistributionConfig) -> Self {
        Self {
            liveness_interval: Duration::from_secs(config.liveness_interval_seconds),
            outbound_capacity: config.outbound_queue_capacity,
        }
    }
}

impl Default for DistributionSettings {
    fn default() -> Self {
        Self {
            liveness_interval: Duration::from_secs(30),
            outbound_capacity: 32,
        }
    }
}

enum HubEvent {
    Connected { id: ConnectionId, outbound: Outbound },
    Inbound { id: ConnectionId, message: ClientMessage },
    Fault { id: ConnectionId, reason: String },
    Closed { id: ConnectionId },
    Broadcast { snapshot: Arc<PlaylistSnapshot> },
    Count { reply: oneshot::Sender<usize> },
}

/// Owner of all connection records
pub struct DistributionLayer {
    settings: DistributionSettings,
    snapshots: watch::Receiver<Arc<PlaylistSnapshot>>,
    events: mpsc::UnboundedReceiver<HubEvent>,
    records: HashMap<ConnectionId, ConnectionRecord>,
    latest_version: u64,
    cancel: CancellationToken,
}

impl DistributionLayer {
    /// Start the hub. Called once at startup with the playlist's snapshot
    /// feed; the returned handle is what the HTTP layer uses.
    pub fn initialize(
        settings: DistributionSettings,
        snapshots: watch::Receiver<Arc<PlaylistSnapshot>>,
    ) -> DistributionHandle {
        let (event_tx, events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let layer = Self {
            settings,
            snapshots,
            events,
            records: HashMap::new(),
            latest_version: 0,
            cancel: cancel.clone(),
        };
        tokio::spawn(layer.run());
        info!(
            "Distribution layer started (liveness probe every {:?})",
            settings.liveness_interval
        );

        DistributionHandle {
            events: event_tx,
            settings,
            cancel,
        }
    }

    async fn run(mut self) {
        let period = self.settings.liveness_interval;
        let mut probe = interval_at(Instant::now() + period, period);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut snapshots_open = true;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                changed = self.snapshots.changed(), if snapshots_open => match changed {
                    Ok(()) => {
                        let snapshot = self.snapshots.borrow_and_update().clone();
                        self.broadcast(&snapshot);
                    }
                    Err(_) => {
                        warn!("Playlist feed closed, no further updates will be pushed");
                        snapshots_open = false;
                    }
                },
                _ = probe.tick() => self.probe_liveness(),
            }
        }

        info!("Distribution layer stopped, closing {} connections", self.records.len());
        self.records.clear();
    }

    fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connected { id, outbound } => self.accept(id, outbound),
            HubEvent::Inbound { id, message } => self.receive(id, message),
            HubEvent::Fault { id, reason } => {
                if let Some(record) = self.records.get_mut(&id) {
                    record.status = ConnectionStatus::Error;
                    warn!("Connection {} failed: {}", id, reason);
                    self.purge(id);
                }
            }
            HubEvent::Closed { id } => {
                if let Some(record) = self.records.get_mut(&id) {
                    record.status = ConnectionStatus::Disconnected;
                    self.purge(id);
                }
            }
            HubEvent::Broadcast { snapshot } => {
                self.broadcast(&snapshot);
            }
            HubEvent::Count { reply } => {
                let _ = reply.send(self.records.len());
            }
        }
    }

    /// Register a connection and send it the full current snapshot
    fn accept(&mut self, id: ConnectionId, outbound: Outbound) {
        let mut record = ConnectionRecord {
            outbound,
            status: ConnectionStatus::Connecting,
            last_seen: Instant::now(),
            awaiting_pong: false,
            last_version: None,
        };

        let snapshot = self.snapshots.borrow().clone();
        let frame = match encode_snapshot(SnapshotKind::List, &snapshot) {
            Ok(text) => Utf8Bytes::from(text),
            Err(e) => {
                error!("Failed to encode snapshot for new connection {}: {}", id, e);
                return;
            }
        };

        if record.push(id, frame) {
            record.status = ConnectionStatus::Connected;
            record.last_version = Some(snapshot.version);
            self.latest_version = self.latest_version.max(snapshot.version);
            self.records.insert(id, record);
            info!(
                "Client {} connected, sent {} items (version {}); {} connected",
                id,
                snapshot.len(),
                snapshot.version,
                self.records.len()
            );
        }
    }

    fn receive(&mut self, id: ConnectionId, message: ClientMessage) {
        let Some(record) = self.records.get_mut(&id) else {
            debug!("Message from unknown connection {} ignored", id);
            return;
        };
        record.last_seen = Instant::now();
        record.awaiting_pong = false;

        match message {
            ClientMessage::Ping => {
                if !record.push(id, Utf8Bytes::from(encode_pong())) {
                    self.purge(id);
                }
            }
            ClientMessage::Pong => debug!("Pong from {}", id),
            ClientMessage::Unknown => debug!("Ignoring unknown message type from {}", id),
        }
    }

    /// Push a full snapshot to every connection. Returns how many
    /// connections accepted it.
    fn broadcast(&mut self, snapshot: &PlaylistSnapshot) -> usize {
        if snapshot.version < self.latest_version {
            debug!(
                "Skipping stale snapshot version {} (latest {})",
                snapshot.version, self.latest_version
            );
            return 0;
        }
        self.latest_version = snapshot.version;

        let frame = match encode_snapshot(SnapshotKind::Update, snapshot) {
            Ok(text) => Utf8Bytes::from(text),
            Err(e) => {
                error!("Failed to encode snapshot version {}: {}", snapshot.version, e);
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, record) in self.records.iter_mut() {
            if record.last_version.is_some_and(|sent| sent > snapshot.version) {
                continue;
            }
            if record.push(*id, frame.clone()) {
                record.last_version = Some(snapshot.version);
                delivered += 1;
            } else {
                dead.push(*id);
            }
        }
        for id in dead {
            self.purge(id);
        }

        info!(
            "Broadcast playlist version {} ({} items) to {} clients",
            snapshot.version,
            snapshot.len(),
            delivered
        );
        delivered
    }

    /// Purge connections that ignored the previous probe, then probe the rest
    fn probe_liveness(&mut self) {
        let mut dead = Vec::new();
        for (id, record) in self.records.iter_mut() {
            if record.awaiting_pong {
                warn!(
                    "Connection {} missed its liveness probe (last seen {:?} ago)",
                    id,
                    record.last_seen.elapsed()
                );
                record.status = ConnectionStatus::Error;
                dead.push(*id);
                continue;
            }
            if record.push(*id, Utf8Bytes::from(encode_ping())) {
                record.awaiting_pong = true;
            } else {
                dead.push(*id);
            }
        }
        for id in dead {
            self.purge(id);
        }
    }

    fn purge(&mut self, id: ConnectionId) {
        if let Some(record) = self.records.remove(&id) {
            info!(
                "Client {} removed ({:?}); {} connected",
                id,
                record.status,
                self.records.len()
            );
        }
    }
}

/// Cloneable handle used by socket tasks and the rest of the server
#[derive(Clone)]
pub struct DistributionHandle {
    events: mpsc::UnboundedSender<HubEvent>,
    settings: DistributionSettings,
    cancel: CancellationToken,
}

impl DistributionHandle {
    /// Announce a new connection. Returns its id, or `None` when the layer
    /// has shut down.
    pub fn register(&self, outbound: Outbound) -> Option<ConnectionId> {
        let id = Uuid::new_v4();
        self.events.send(HubEvent::Connected { id, outbound }).ok()?;
        Some(id)
    }

    pub fn inbound(&self, id: ConnectionId, message: ClientMessage) {
        let _ = self.events.send(HubEvent::Inbound { id, message });
    }

    pub fn fault(&self, id: ConnectionId, reason: impl Into<String>) {
        let _ = self.events.send(HubEvent::Fault {
            id,
            reason: reason.into(),
        });
    }

    pub fn closed(&self, id: ConnectionId) {
        let _ = self.events.send(HubEvent::Closed { id });
    }

    /// Push a snapshot to every connected client. Fire-and-forget.
    pub fn broadcast(&self, snapshot: Arc<PlaylistSnapshot>) {
        let _ = self.events.send(HubEvent::Broadcast { snapshot });
    }

    pub async fn connection_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.events.send(HubEvent::Count { reply }).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Capacity to use for new outbound queues
    pub fn outbound_capacity(&self) -> usize {
        self.settings.outbound_capacity
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
