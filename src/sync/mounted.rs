use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::manifest::PlaylistManifest;
use super::{RemoteFile, RemoteSource};
use crate::error::SyncError;
use crate::media::is_supported;

/// Remote source backed by a locally mounted cloud drive folder (rclone,
/// Drive for desktop, an SMB share and so on). Only the top level of the
/// folder is mirrored.
#[derive(Debug, Clone)]
pub struct MountedDriveSource {
    root: PathBuf,
    extensions: Vec<String>,
    manifest_name: String,
}

impl MountedDriveSource {
    /// Create a new source over `root`
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>, manifest_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extensions,
            manifest_name: manifest_name.into(),
        }
    }
}

#[async_trait]
impl RemoteSource for MountedDriveSource {
    fn describe(&self) -> String {
        format!("mounted drive at {}", self.root.display())
    }

    async fn check(&self) -> Result<(), SyncError> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            _ => Err(SyncError::SourceUnavailable(self.root.clone())),
        }
    }

    async fn list(&self) -> Result<Vec<RemoteFile>, SyncError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|_| SyncError::SourceUnavailable(self.root.clone()))?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    debug!("Skipping non UTF-8 file name {:?}", raw);
                    continue;
                }
            };
            if name.starts_with('.') || !is_supported(Path::new(&name), &self.extensions) {
                continue;
            }

            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            files.push(RemoteFile {
                name,
                size: meta.len(),
                modified: meta.modified().ok(),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn download(&self, file: &RemoteFile, dest: &Path) -> Result<(), SyncError> {
        tokio::fs::copy(self.root.join(&file.name), dest)
            .await
            .map(|_| ())
            .map_err(|source| SyncError::Download {
                name: file.name.clone(),
                source,
            })
    }

    async fn manifest(&self) -> Result<Option<PlaylistManifest>, SyncError> {
        let path = self.root.join(&self.manifest_name);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        PlaylistManifest::parse(&content)
            .map(Some)
            .map_err(|e| SyncError::Manifest {
                path,
                reason: e.to_string(),
            })
    }

    fn watch_root(&self) -> Option<PathBuf> {
        Some(self.root.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(dir: &Path) -> MountedDriveSource {
        MountedDriveSource::new(dir, vec!["jpg".into(), "mp4".into()], "playlist.toml")
    }

    #[tokio::test]
    async fn test_lists_only_supported_visible_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.mp4"), b"video").unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"img").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"text").unwrap();
        std::fs::write(dir.path().join(".hidden.jpg"), b"img").unwrap();
        std::fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        let files = source(dir.path()).list().await.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.mp4"]);
        assert_eq!(files[1].size, 5);
    }

    #[tokio::test]
    async fn test_missing_root_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let gone = dir.path().join("unmounted");
        let err = source(&gone).check().await.unwrap_err();
        assert!(matches!(err, SyncError::SourceUnavailable(path) if path == gone));
    }

    #[tokio::test]
    async fn test_manifest_is_optional() {
        let dir = TempDir::new().unwrap();
        let src = source(dir.path());
        assert!(src.manifest().await.unwrap().is_none());

        std::fs::write(dir.path().join("playlist.toml"), "[[items]]\nfile = \"a.jpg\"\n").unwrap();
        let manifest = src.manifest().await.unwrap().unwrap();
        assert_eq!(manifest.items[0].file, "a.jpg");

        std::fs::write(dir.path().join("playlist.toml"), "items = 3").unwrap();
        assert!(matches!(src.manifest().await, Err(SyncError::Manifest { .. })));
    }
}
