use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::cache::CacheStore;
use super::transport::JsonFetcher;
use crate::error::TransportError;

/// Cache-first reads: a fresh cached value is served without touching the
/// network, otherwise the live result is fetched and written back.
#[derive(Clone)]
pub struct CachedFetcher {
    fetcher: Arc<dyn JsonFetcher>,
    cache: CacheStore,
}

impl CachedFetcher {
    pub fn new(fetcher: Arc<dyn JsonFetcher>, cache: CacheStore) -> Self {
        Self { fetcher, cache }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub async fn get_json<T>(&self, path: &str, key: &str) -> Result<T, TransportError>
    where
        T: Serialize + DeserializeOwned,
    {
        if let Some(hit) = self.cache.read::<T>(key).await {
            debug!("Serving {} from cache", key);
            return Ok(hit);
        }

        let value = self.fetcher.fetch_json(path).await?;
        let data: T = serde_json::from_value(value)?;
        if let Err(e) = self.cache.write(key, &data).await {
            warn!("Failed to cache {}: {}", key, e);
        }
        Ok(data)
    }
}
