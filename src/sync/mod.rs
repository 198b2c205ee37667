use async_trait::async_trait;
use futures_util::FutureExt;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ServiceError, SyncError};
use crate::media::is_supported;
use crate::playlist::PlaylistHandle;
use crate::power::PowerControl;

pub mod manifest;
pub mod mounted;

pub use manifest::{build_playlist, ManifestEntry, PlaylistManifest};
pub use mounted::MountedDriveSource;

/// A file as seen in the remote source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Where media comes from
#[async_trait]
pub trait RemoteSource: Send + Sync {
    fn describe(&self) -> String;

    /// Fail with [`SyncError::SourceUnavailable`] when the source cannot be reached
    async fn check(&self) -> Result<(), SyncError>;

    async fn list(&self) -> Result<Vec<RemoteFile>, SyncError>;

    /// Copy `file` to `dest`, overwriting it
    async fn download(&self, file: &RemoteFile, dest: &Path) -> Result<(), SyncError>;

    async fn manifest(&self) -> Result<Option<PlaylistManifest>, SyncError>;

    /// Local directory whose changes should trigger an early sync, if any
    fn watch_root(&self) -> Option<PathBuf> {
        None
    }
}

/// Outcome of one reconcile pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub downloaded: usize,
    pub removed: usize,
    pub failed: usize,
    pub items: usize,
    pub version: u64,
}

struct Inner {
    source: Arc<dyn RemoteSource>,
    media_dir: PathBuf,
    extensions: Vec<String>,
    poll_interval: Duration,
    playlist: PlaylistHandle,
    /// Milliseconds stamped on items without their own duration; 0 leaves them unset
    default_duration_ms: AtomicU64,
    initialized: AtomicBool,
    started: AtomicBool,
    paused: watch::Sender<bool>,
    nudge: Notify,
    cancel: CancellationToken,
}

/// Mirrors a [`RemoteSource`] into the canonical media directory and feeds
/// the resulting list to the playlist manager
#[derive(Clone)]
pub struct Synchronizer {
    inner: Arc<Inner>,
}

impl Synchronizer {
    /// Create a new synchronizer. Nothing runs until [`initialize`](Self::initialize)
    /// and [`start_sync`](Self::start_sync).
    pub fn new(
        source: Arc<dyn RemoteSource>,
        media_dir: impl Into<PathBuf>,
        extensions: Vec<String>,
        poll_interval: Duration,
        playlist: PlaylistHandle,
    ) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                source,
                media_dir: media_dir.into(),
                extensions,
                poll_interval,
                playlist,
                default_duration_ms: AtomicU64::new(0),
                initialized: AtomicBool::new(false),
                started: AtomicBool::new(false),
                paused,
                nudge: Notify::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Prepare the media directory and run the bootstrap sync
    pub async fn initialize(&self) -> Result<SyncReport, SyncError> {
        let media_dir = &self.inner.media_dir;
        tokio::fs::create_dir_all(media_dir)
            .await
            .map_err(|source| SyncError::MediaDirectory {
                path: media_dir.clone(),
                source,
            })?;

        info!("Initializing synchronizer from {}", self.inner.source.describe());
        self.sync_now().await
    }

    /// True once a sync pass has completed
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        *self.inner.paused.borrow()
    }

    /// Publish `duration` for items the source leaves untimed
    pub fn set_default_duration(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.inner.default_duration_ms.store(millis, Ordering::SeqCst);
    }

    /// Begin background polling. Calling it again is a no-op.
    pub fn start_sync(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            debug!("Background sync already running");
            return;
        }
        tokio::spawn(self.clone().run());
        info!("Background sync started (every {:?})", self.inner.poll_interval);
    }

    /// Ask the background loop to sync before the next poll tick
    pub fn trigger(&self) {
        self.inner.nudge.notify_one();
    }

    /// Stop the background loop
    pub fn stop(&self) {
        self.inner.cancel.cancel();
    }

    async fn run(self) {
        let inner = &self.inner;
        let mut paused = inner.paused.subscribe();

        loop {
            tokio::select! {
                _ = inner.cancel.cancelled() => break,
                _ = tokio::time::sleep(inner.poll_interval) => {}
                _ = inner.nudge.notified() => debug!("Sync requested early"),
            }

            while *paused.borrow_and_update() {
                tokio::select! {
                    _ = inner.cancel.cancelled() => return,
                    changed = paused.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }

            // this pass covers every nudge queued so far, including those sent while paused
            let _ = inner.nudge.notified().now_or_never();

            if let Err(e) = self.sync_now().await {
                warn!("Sync failed, retrying on the next tick: {}", e);
            }
        }
        debug!("Background sync stopped");
    }

    /// Reconcile the media directory against the source and publish the result
    pub async fn sync_now(&self) -> Result<SyncReport, SyncError> {
        let inner = &self.inner;
        inner.source.check().await?;

        let remote = inner.source.list().await?;
        let local = self.local_files().await?;
        let mut report = SyncReport::default();
        let mut available = Vec::with_capacity(remote.len());

        for file in &remote {
            if needs_download(file, local.get(&file.name)) {
                match self.fetch(file).await {
                    Ok(()) => {
                        debug!("Downloaded {} ({} bytes)", file.name, file.size);
                        report.downloaded += 1;
                    }
                    Err(e) => {
                        error!("{}", e);
                        report.failed += 1;
                        if !local.contains_key(&file.name) {
                            continue;
                        }
                    }
                }
            }
            available.push(file.name.clone());
        }

        let remote_names: HashSet<&str> = remote.iter().map(|f| f.name.as_str()).collect();
        for stale in local.keys().filter(|name| !remote_names.contains(name.as_str())) {
            match tokio::fs::remove_file(inner.media_dir.join(stale)).await {
                Ok(()) => {
                    debug!("Removed {}", stale);
                    report.removed += 1;
                }
                Err(e) => warn!("Failed to remove stale media {}: {}", stale, e),
            }
        }

        let manifest = match inner.source.manifest().await {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Ignoring playlist manifest: {}", e);
                None
            }
        };

        let mut items = build_playlist(&available, manifest.as_ref());
        let default_ms = inner.default_duration_ms.load(Ordering::SeqCst);
        if default_ms > 0 {
            for item in &mut items {
                item.duration.get_or_insert(default_ms);
            }
        }

        let snapshot = inner.playlist.replace_snapshot(items).await?;
        inner.initialized.store(true, Ordering::SeqCst);

        report.items = snapshot.len();
        report.version = snapshot.version;
        info!(
            "Sync complete: {} items, {} downloaded, {} removed, {} failed",
            report.items, report.downloaded, report.removed, report.failed
        );
        Ok(report)
    }

    async fn fetch(&self, file: &RemoteFile) -> Result<(), SyncError> {
        let dest = self.inner.media_dir.join(&file.name);
        let part = self.inner.media_dir.join(format!(".{}.part", file.name));

        if let Err(e) = self.inner.source.download(file, &part).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }
        tokio::fs::rename(&part, &dest)
            .await
            .map_err(|source| SyncError::Download {
                name: file.name.clone(),
                source,
            })
    }

    async fn local_files(&self) -> Result<HashMap<String, LocalFile>, SyncError> {
        let media_dir = &self.inner.media_dir;
        let mut entries = tokio::fs::read_dir(media_dir)
            .await
            .map_err(|source| SyncError::MediaDirectory {
                path: media_dir.clone(),
                source,
            })?;

        let mut files = HashMap::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || !is_supported(Path::new(&name), &self.inner.extensions) {
                continue;
            }
            let meta = entry.metadata().await?;
            if meta.is_file() {
                files.insert(
                    name,
                    LocalFile {
                        size: meta.len(),
                        modified: meta.modified().ok(),
                    },
                );
            }
        }
        Ok(files)
    }
}

#[derive(Debug, Clone, Copy)]
struct LocalFile {
    size: u64,
    modified: Option<SystemTime>,
}

fn needs_download(remote: &RemoteFile, local: Option<&LocalFile>) -> bool {
    let Some(local) = local else {
        return true;
    };
    if remote.size != local.size {
        return true;
    }
    match (remote.modified, local.modified) {
        (Some(remote), Some(local)) => remote > local,
        _ => false,
    }
}

#[async_trait]
impl PowerControl for Synchronizer {
    async fn pause(&self) -> Result<(), ServiceError> {
        self.inner.paused.send_replace(true);
        Ok(())
    }

    async fn resume(&self) -> Result<(), ServiceError> {
        self.inner.paused.send_replace(false);
        Ok(())
    }
}
