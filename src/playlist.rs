use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::PlaylistClosed;
use crate::media::MediaItem;

/// An ordered playlist plus the version marker clients use to tell stale
/// pushes from fresh ones
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaylistSnapshot {
    pub version: u64,
    pub items: Vec<MediaItem>,
}

impl PlaylistSnapshot {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Navigation direction through the display sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Previous,
}

impl Direction {
    /// Circular step. `len` must be non-zero.
    pub fn step(self, index: usize, len: usize) -> usize {
        match self {
            Direction::Next => (index + 1) % len,
            Direction::Previous => (index + len - 1) % len,
        }
    }
}

/// Authoritative playlist state: the current snapshot and the cursor into it
#[derive(Debug, Default)]
pub struct Playlist {
    snapshot: Arc<PlaylistSnapshot>,
    cursor: usize,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole list. The version is bumped even when the content
    /// is unchanged, and duplicate ids keep only their first occurrence.
    pub fn replace_snapshot(&mut self, items: Vec<MediaItem>) -> Arc<PlaylistSnapshot> {
        let mut seen = HashSet::with_capacity(items.len());
        let total = items.len();
        let items: Vec<MediaItem> = items
            .into_iter()
            .filter(|item| seen.insert(item.id.clone()))
            .collect();
        if items.len() != total {
            warn!("Dropped {} media items with duplicate ids", total - items.len());
        }

        self.cursor = clamp_cursor(self.cursor, items.len());
        self.snapshot = Arc::new(PlaylistSnapshot {
            version: self.snapshot.version + 1,
            items,
        });
        self.snapshot.clone()
    }

    /// Cursor position, absent iff the playlist is empty
    pub fn cursor(&self) -> Option<usize> {
        if self.snapshot.is_empty() {
            None
        } else {
            Some(self.cursor)
        }
    }

    pub fn current_item(&self) -> Option<&MediaItem> {
        self.snapshot.items.get(self.cursor)
    }

    /// Move the cursor circularly. An empty playlist leaves it untouched.
    pub fn navigate(&mut self, direction: Direction) -> Option<&MediaItem> {
        let len = self.snapshot.len();
        if len == 0 {
            return None;
        }
        self.cursor = direction.step(self.cursor, len);
        self.snapshot.items.get(self.cursor)
    }

    pub fn all(&self) -> Arc<PlaylistSnapshot> {
        self.snapshot.clone()
    }
}

/// Keep `cursor` inside `[0, len)`; shrinking lists pull it back to the
/// last item, an empty list resets it to 0.
pub fn clamp_cursor(cursor: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        cursor.min(len - 1)
    }
}

enum PlaylistCommand {
    Replace {
        items: Vec<MediaItem>,
        reply: oneshot::Sender<Arc<PlaylistSnapshot>>,
    },
    Navigate {
        direction: Direction,
        reply: oneshot::Sender<Option<MediaItem>>,
    },
    Current {
        reply: oneshot::Sender<Option<MediaItem>>,
    },
}

/// Task that exclusively owns the [`Playlist`] and publishes every new
/// snapshot on a watch channel
pub struct PlaylistManager {
    playlist: Playlist,
    commands: mpsc::Receiver<PlaylistCommand>,
    publisher: watch::Sender<Arc<PlaylistSnapshot>>,
}

impl PlaylistManager {
    /// Start the manager task and return a handle to it. The task ends when
    /// every handle has been dropped.
    pub fn spawn() -> PlaylistHandle {
        let (command_tx, commands) = mpsc::channel(64);
        let playlist = Playlist::new();
        let (publisher, snapshots) = watch::channel(playlist.all());

        let manager = Self {
            playlist,
            commands,
            publisher,
        };
        tokio::spawn(manager.run());
        info!("Playlist manager started");

        PlaylistHandle {
            commands: command_tx,
            snapshots,
        }
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                PlaylistCommand::Replace { items, reply } => {
                    let snapshot = self.playlist.replace_snapshot(items);
                    info!(
                        "Playlist replaced: version {} with {} items",
                        snapshot.version,
                        snapshot.len()
                    );
                    // Notify unconditionally, even with no subscribers yet
                    self.publisher.send_replace(snapshot.clone());
                    let _ = reply.send(snapshot);
                }
                PlaylistCommand::Navigate { direction, reply } => {
                    let item = self.playlist.navigate(direction).cloned();
                    debug!("Server cursor moved {:?} to {:?}", direction, self.playlist.cursor());
                    let _ = reply.send(item);
                }
                PlaylistCommand::Current { reply } => {
                    let _ = reply.send(self.playlist.current_item().cloned());
                }
            }
        }
        debug!("Playlist manager stopped");
    }
}

/// Cloneable access to the playlist manager
#[derive(Clone)]
pub struct PlaylistHandle {
    commands: mpsc::Sender<PlaylistCommand>,
    snapshots: watch::Receiver<Arc<PlaylistSnapshot>>,
}

impl PlaylistHandle {
    pub async fn replace_snapshot(&self, items: Vec<MediaItem>) -> Result<Arc<PlaylistSnapshot>, PlaylistClosed> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(PlaylistCommand::Replace { items, reply })
            .await
            .map_err(|_| PlaylistClosed)?;
        rx.await.map_err(|_| PlaylistClosed)
    }

    pub async fn current_item(&self) -> Result<Option<MediaItem>, PlaylistClosed> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(PlaylistCommand::Current { reply })
            .await
            .map_err(|_| PlaylistClosed)?;
        rx.await.map_err(|_| PlaylistClosed)
    }

    pub async fn navigate(&self, direction: Direction) -> Result<Option<MediaItem>, PlaylistClosed> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(PlaylistCommand::Navigate { direction, reply })
            .await
            .map_err(|_| PlaylistClosed)?;
        rx.await.map_err(|_| PlaylistClosed)
    }

    /// Latest published snapshot
    pub fn all(&self) -> Arc<PlaylistSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Receiver that observes every snapshot change
    pub fn subscribe(&self) -> watch::Receiver<Arc<PlaylistSnapshot>> {
        self.snapshots.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}
