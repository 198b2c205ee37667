use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, FileIdMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::SyncError;
use crate::sync::Synchronizer;

/// Watches the remote source folder and nudges the synchronizer when
/// something in it changes. Dropping the watcher stops it.
pub struct SourceWatcher {
    root: PathBuf,
    _debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
}

impl SourceWatcher {
    /// Start watching `root` with the given debounce window
    pub fn start(root: &Path, synchronizer: Synchronizer, debounce: Duration) -> Result<Self, SyncError> {
        if !root.is_dir() {
            return Err(SyncError::SourceUnavailable(root.to_path_buf()));
        }

        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| match result {
            Ok(events) => {
                let paths = events.iter().flat_map(|event| event.paths.iter().map(PathBuf::as_path));
                if nudge_on_change(paths, &synchronizer) {
                    debug!("Source changed ({} events), requesting sync", events.len());
                }
            }
            Err(errors) => {
                for error in errors {
                    error!("Source watcher error: {:?}", error);
                }
            }
        })?;

        debouncer.watcher().watch(root, RecursiveMode::NonRecursive)?;
        info!("Watching remote source {} ({}ms debounce)", root.display(), debounce.as_millis());

        Ok(Self {
            root: root.to_path_buf(),
            _debouncer: debouncer,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Trigger a sync if any changed path is a visible file. Returns whether it did.
fn nudge_on_change<'a>(paths: impl IntoIterator<Item = &'a Path>, synchronizer: &Synchronizer) -> bool {
    let relevant = paths.into_iter().any(|path| {
        !path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'))
    });
    if relevant {
        synchronizer.trigger();
    }
    relevant
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::PlaylistManager;
    use crate::sync::MountedDriveSource;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_missing_directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        let playlist = PlaylistManager::spawn();
        let sync = Synchronizer::new(
            Arc::new(MountedDriveSource::new(dir.path(), vec!["jpg".into()], "playlist.toml")),
            dir.path().join("media"),
            vec!["jpg".into()],
            Duration::from_secs(3600),
            playlist,
        );

        let result = SourceWatcher::start(&dir.path().join("absent"), sync, Duration::from_millis(50));
        assert!(matches!(result, Err(SyncError::SourceUnavailable(_))));
    }

    fn fixture(source: &Path, media: &Path) -> (Synchronizer, crate::playlist::PlaylistHandle) {
        let playlist = PlaylistManager::spawn();
        let sync = Synchronizer::new(
            Arc::new(MountedDriveSource::new(source, vec!["jpg".into()], "playlist.toml")),
            media,
            vec!["jpg".into()],
            Duration::from_secs(3600),
            playlist.clone(),
        );
        (sync, playlist)
    }

    #[tokio::test]
    async fn test_watcher_starts_on_existing_directory() {
        let source = TempDir::new().unwrap();
        let media = TempDir::new().unwrap();
        let (sync, _playlist) = fixture(source.path(), media.path());

        let watcher = SourceWatcher::start(source.path(), sync, Duration::from_millis(100)).unwrap();
        assert_eq!(watcher.root(), source.path());
    }

    #[tokio::test]
    async fn test_hidden_files_do_not_nudge() {
        let source = TempDir::new().unwrap();
        let media = TempDir::new().unwrap();
        let (sync, _playlist) = fixture(source.path(), media.path());

        let hidden = source.path().join(".DS_Store");
        let partial = source.path().join(".b.jpg.part");
        assert!(!nudge_on_change([hidden.as_path(), partial.as_path()], &sync));
        assert!(!nudge_on_change(std::iter::empty::<&Path>(), &sync));
    }

    #[tokio::test]
    async fn test_change_nudges_background_sync() {
        let source = TempDir::new().unwrap();
        let media = TempDir::new().unwrap();
        let (sync, playlist) = fixture(source.path(), media.path());
        sync.initialize().await.unwrap();
        sync.start_sync();

        let mut updates = playlist.subscribe();
        updates.borrow_and_update();
        let fresh = source.path().join("fresh.jpg");
        std::fs::write(&fresh, b"img").unwrap();

        let hidden = source.path().join(".hidden");
        assert!(nudge_on_change([hidden.as_path(), fresh.as_path()], &sync));

        // the poll interval is an hour, so only the nudge can publish this
        timeout(Duration::from_secs(5), updates.changed())
            .await
            .expect("nudge did not trigger a sync")
            .unwrap();
        assert_eq!(playlist.all().items[0].id, "fresh.jpg");
        sync.stop();
    }
}
