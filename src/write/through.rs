//! Write-through: origin first, cache second

use crate::adapter::CacheAdapter;
use crate::codec;
use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Synchronous dual write
///
/// The origin is the source of truth: its failure propagates and leaves the
/// cache untouched, while a cache failure after a successful origin write is
/// only logged.
#[derive(Clone)]
pub struct WriteThrough {
    adapter: Arc<dyn CacheAdapter>,
}

impl WriteThrough {
    pub fn new(adapter: Arc<dyn CacheAdapter>) -> Self {
        Self { adapter }
    }

    /// Run `write_fn` against the origin, then cache its result under `key`
    pub async fn write<T, F, Fut>(&self, key: &CacheKey, write_fn: F, ttl: Option<Duration>) -> Result<T>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let result = write_fn().await.map_err(|e| {
            warn!("Write-through origin write failed for {}: {:#}", key, e);
            CacheError::Origin(e)
        })?;

        let stored = match codec::encode(&result, None) {
            Ok(bytes) => self.adapter.set(key.as_str(), bytes, ttl).await,
            Err(e) => Err(e),
        };

        match stored {
            Ok(()) => debug!("Write-through committed: {}", key),
            Err(e) => {
                warn!(
                    "Write-through cache update failed for {} (origin committed): {}",
                    key, e
                );
                // Drop the previous value so readers fall back to the origin.
                if let Err(e) = self.adapter.delete(key.as_str()).await {
                    warn!("Could not evict stale entry {}: {}", key, e);
                }
            }
        }

        Ok(result)
    }
}
