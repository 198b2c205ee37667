use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

/// Errors surfaced at the HTTP boundary
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Service Unavailable")]
    Unavailable,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status, self.to_string()).into_response()
    }
}

/// The playlist manager task is gone and can no longer accept commands
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Playlist manager is no longer running")]
pub struct PlaylistClosed;

/// Remote source synchronization failures
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote source is not accessible: {}", .0.display())]
    SourceUnavailable(PathBuf),

    #[error("Media directory {} could not be prepared: {source}", .path.display())]
    MediaDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to download {name}: {source}")]
    Download {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid playlist manifest {}: {reason}", .path.display())]
    Manifest { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Playlist(#[from] PlaylistClosed),

    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),
}

/// Failure reported by a power-managed service while pausing or resuming
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0} is not supported by this service")]
    Unsupported(&'static str),

    #[error("{0}")]
    Failed(String),
}

/// Power coordinator errors
#[derive(Error, Debug)]
pub enum PowerError {
    #[error("Service {name} must implement pause() and resume() methods (missing {missing})")]
    MissingCapability { name: String, missing: &'static str },

    #[error("Service {0} is already registered")]
    DuplicateService(String),

    #[error("Power coordinator has stopped")]
    Stopped,
}

/// Client-side connection and fetch faults. All of them are transient from
/// the consumer's point of view.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server responded with status {0}")]
    Status(u16),

    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::WebSocket(Box::new(err))
    }
}

/// Local cache failures. Reads never return these; they are logged and
/// treated as a miss.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache entry is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The media consumer task has shut down
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Media consumer has stopped")]
pub struct ConsumerStopped;
