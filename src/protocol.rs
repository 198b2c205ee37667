//! Push channel wire format.
//!
//! Every frame is a JSON object with a `type` discriminator. Snapshots are
//! always full playlists: `mediaList` is sent once when a connection opens and
//! `mediaUpdate` on every later change. Unknown types decode to `Unknown` and
//! are ignored by both sides.

use serde::{Deserialize, Serialize};

use crate::media::MediaItem;
use crate::playlist::PlaylistSnapshot;

/// Frames sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    MediaList {
        media: Vec<MediaItem>,
        #[serde(default)]
        version: u64,
    },
    MediaUpdate {
        media: Vec<MediaItem>,
        #[serde(default)]
        version: u64,
    },
    Ping,
    Pong,
    #[serde(other)]
    Unknown,
}

/// Frames sent by display clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Ping,
    Pong,
    #[serde(other)]
    Unknown,
}

/// Which snapshot frame to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// Initial full resync on connect
    List,
    /// Change broadcast
    Update,
}

#[derive(Serialize)]
struct SnapshotFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media: &'a [MediaItem],
    version: u64,
}

/// Serialize a snapshot without cloning its items
pub fn encode_snapshot(kind: SnapshotKind, snapshot: &PlaylistSnapshot) -> serde_json::Result<String> {
    let kind = match kind {
        SnapshotKind::List => "mediaList",
        SnapshotKind::Update => "mediaUpdate",
    };
    serde_json::to_string(&SnapshotFrame {
        kind,
        media: &snapshot.items,
        version: snapshot.version,
    })
}

pub fn encode_ping() -> String {
    r#"{"type":"ping"}"#.to_string()
}

pub fn encode_pong() -> String {
    r#"{"type":"pong"}"#.to_string()
}
