use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::client::CacheConfig;
use crate::error::CacheError;

/// On-disk entry: `{ "data": <payload>, "timestamp": <epoch ms> }`
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    data: T,
    timestamp: i64,
}

/// Key/timestamp tagged JSON files, one per key, with TTL enforced on read
#[derive(Debug, Clone)]
pub struct CacheStore {
    directory: PathBuf,
    namespace: String,
    ttl: Duration,
}

impl CacheStore {
    /// Create a new store. The directory is created lazily on first write.
    pub fn new(directory: impl Into<PathBuf>, namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            directory: directory.into(),
            namespace: namespace.into(),
            ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            &config.directory,
            &config.namespace,
            Duration::from_secs(config.ttl_seconds),
        )
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let key: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.directory.join(format!("{}_{}.json", self.namespace, key))
    }

    pub async fn write<T: Serialize>(&self, key: &str, data: &T) -> Result<(), CacheError> {
        self.write_at(key, data, Utc::now().timestamp_millis()).await
    }

    /// Store `data` stamped with `timestamp` (epoch ms). Replaces the file
    /// atomically.
    pub async fn write_at<T: Serialize>(&self, key: &str, data: &T, timestamp: i64) -> Result<(), CacheError> {
        let body = serde_json::to_vec(&CacheEntry { data, timestamp })?;
        tokio::fs::create_dir_all(&self.directory).await?;

        let path = self.entry_path(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Cached {} at {}", key, path.display());
        Ok(())
    }

    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.read_at(key, Utc::now().timestamp_millis()).await
    }

    /// Fresh payload for `key` as of `now` (epoch ms). Missing, expired and
    /// unreadable entries are all a miss; the latter two are deleted.
    pub async fn read_at<T: DeserializeOwned>(&self, key: &str, now: i64) -> Option<T> {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cache entry {} unreadable: {}", path.display(), e);
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Discarding corrupt cache entry {}: {}", path.display(), e);
                self.remove(key).await;
                return None;
            }
        };

        let age = now.saturating_sub(entry.timestamp);
        if age > self.ttl.as_millis() as i64 {
            debug!("Cache entry {} expired ({}ms old)", key, age);
            self.remove(key).await;
            return None;
        }

        Some(entry.data)
    }

    pub async fn remove(&self, key: &str) {
        let path = self.entry_path(key);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove cache entry {}: {}", path.display(), e);
            }
        }
    }
}
