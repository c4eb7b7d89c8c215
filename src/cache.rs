//! # Cache facade
//!
//! [`Cache`] wires a configured backend, the metrics decorator, the tag index,
//! the TTL policy and both write strategies behind one cloneable handle.
//!
//! Typed values cross the byte-oriented adapters through the JSON envelope of
//! [`crate::codec`]. Backend and serialization failures on reads degrade to a
//! miss; key, profile and TTL errors propagate.
//!
//! ## Example
//!
//! ```rust
//! use ouroboros_cache::{Cache, CacheConfig, InvalidationMode};
//! use ouroboros_cache::tags::hierarchical_tags;
//!
//! # async fn example() -> ouroboros_cache::Result<()> {
//! let cache = Cache::new(CacheConfig::default())?;
//! let key = cache.key(&["products", "42"])?;
//!
//! cache
//!     .set_tagged(&key, &"Widget", None, &hierarchical_tags("products", 42))
//!     .await?;
//! assert_eq!(cache.get::<String>(&key).await?, Some("Widget".to_string()));
//!
//! cache.invalidate_by_tag("products", InvalidationMode::Immediate).await?;
//! assert_eq!(cache.get::<String>(&key).await?, None);
//! # Ok(())
//! # }
//! ```

use crate::adapter::{BackingStore, CacheAdapter, MemoryAdapter, MeteredAdapter, RemoteAdapter, TieredAdapter};
use crate::codec::{self, Stored};
use crate::config::{BackendKind, CacheConfig};
use crate::error::{CacheError, Result};
use crate::key::{build_key, CacheKey};
use crate::metrics::{CacheMetrics, CacheStats};
use crate::tags::{InvalidationEvent, InvalidationMode, InvalidationReason, TagIndex};
use crate::ttl::{TtlPolicy, TtlWindows};
use crate::write::{FlushReport, FlusherHandle, WriteBehind, WriteBehindStats, WriteFn, WriteQueue, WriteThrough};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Longest a backend may keep an entry past its TTL (remote stores round up to seconds)
const EXPIRY_GRACE: Duration = Duration::from_secs(1);

/// How a stored value expires
#[derive(Debug, Clone, Copy)]
enum Expiry {
    /// Plain TTL; `None` never expires
    Ttl(Option<Duration>),
    /// TTL profile: expires after `expire`, refreshed in the background after `revalidate`
    Profile(TtlWindows),
}

impl Expiry {
    fn ttl(&self) -> Option<Duration> {
        match self {
            Expiry::Ttl(ttl) => *ttl,
            Expiry::Profile(windows) => Some(windows.expire),
        }
    }

    fn revalidate_after(&self) -> Option<Duration> {
        match self {
            Expiry::Ttl(_) => None,
            Expiry::Profile(windows) => Some(windows.revalidate),
        }
    }
}

/// Outcome of a cache read
enum Lookup<T> {
    Hit(Stored<T>),
    /// The backend holds nothing for the key
    Absent,
    /// The backend failed or held undecodable bytes
    Unusable,
}

struct CacheInner {
    config: CacheConfig,
    adapter: Arc<dyn CacheAdapter>,
    metrics: Arc<CacheMetrics>,
    tags: RwLock<TagIndex>,
    ttl_policy: TtlPolicy,
    write_through: WriteThrough,
    write_behind: Arc<WriteBehind>,
    /// Keys with a background refresh in progress
    refreshing: Mutex<HashSet<String>>,
}

/// Tag-addressable cache over a configured backend
#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

impl Cache {
    /// In-memory cache; fails for backends that need a store
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::from_config(config, None)
    }

    /// Cache over the backend selected by `config.backend`
    ///
    /// `Remote` and `Tiered` require a `store`; `Memory` ignores it.
    pub fn from_config(config: CacheConfig, store: Option<Arc<dyn BackingStore>>) -> Result<Self> {
        config.validate()?;

        let memory = || match config.max_entries {
            Some(max) => MemoryAdapter::with_max_entries(max),
            None => MemoryAdapter::new(),
        };

        let adapter: Arc<dyn CacheAdapter> = match (config.backend, store) {
            (BackendKind::Memory, store) => {
                if store.is_some() {
                    warn!("Memory backend selected, ignoring the supplied backing store");
                }
                Arc::new(memory())
            }
            (BackendKind::Remote, Some(store)) => {
                Arc::new(RemoteAdapter::namespaced(store, config.namespace.clone()))
            }
            (BackendKind::Tiered, Some(store)) => Arc::new(TieredAdapter::new(
                memory(),
                RemoteAdapter::namespaced(store, config.namespace.clone()),
                config.l1_ttl,
            )),
            (backend, None) => {
                return Err(CacheError::Config(format!(
                    "{:?} backend requires a backing store",
                    backend
                )))
            }
        };

        Self::from_parts(config, adapter, TtlPolicy::default())
    }

    /// Cache over an arbitrary adapter with a custom profile registry
    pub fn from_parts(config: CacheConfig, adapter: Arc<dyn CacheAdapter>, ttl_policy: TtlPolicy) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(CacheMetrics::new());
        let backend = adapter.name();
        let adapter: Arc<dyn CacheAdapter> = Arc::new(MeteredAdapter::new(adapter, metrics.clone()));

        let queue = Arc::new(WriteQueue::new(config.write_behind.max_queue_size));
        let write_behind = WriteBehind::new(adapter.clone(), queue, config.write_behind.clone())
            .with_metrics(metrics.clone());

        info!(
            "Cache initialized (namespace: {}, backend: {})",
            config.namespace, backend
        );

        Ok(Self {
            inner: Arc::new(CacheInner {
                write_through: WriteThrough::new(adapter.clone()),
                write_behind: Arc::new(write_behind),
                adapter,
                metrics,
                tags: RwLock::new(TagIndex::with_expiry_grace(EXPIRY_GRACE)),
                ttl_policy,
                config,
                refreshing: Mutex::new(HashSet::new()),
            }),
        })
    }

    /// Build a key in this cache's namespace
    pub fn key<S: AsRef<str>>(&self, segments: &[S]) -> Result<CacheKey> {
        build_key(&self.inner.config.namespace, segments)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.inner.metrics
    }

    /// Aggregate hit/miss/error counters
    pub fn stats(&self) -> CacheStats {
        self.inner.metrics.stats()
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.inner.ttl_policy
    }

    /// The metered adapter every operation goes through
    pub fn adapter(&self) -> &Arc<dyn CacheAdapter> {
        &self.inner.adapter
    }

    fn default_ttl(&self, ttl: Option<Duration>) -> Option<Duration> {
        ttl.or_else(|| self.inner.config.ttl_with_jitter())
    }

    /// Read and decode, degrading backend and decode failures to a miss
    ///
    /// A key the backend no longer holds leaves the tag index.
    async fn read<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Lookup<T>> {
        let bytes = match self.inner.adapter.get(key.as_str()).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.inner.tags.write().await.remove_key(key.as_str());
                return Ok(Lookup::Absent);
            }
            Err(e) if e.is_degradable() => {
                warn!("Cache read failed for {}, treating as miss: {}", key, e);
                return Ok(Lookup::Unusable);
            }
            Err(e) => return Err(e),
        };

        match codec::decode(&bytes) {
            Ok(stored) => Ok(Lookup::Hit(stored)),
            Err(e) => {
                warn!("Undecodable cache entry {}, treating as miss: {}", key, e);
                self.inner.metrics.record_error(key.as_str());
                Ok(Lookup::Unusable)
            }
        }
    }

    /// Bring the tag index up to date after `key` was written with `ttl`
    async fn record_store(&self, key: &CacheKey, ttl: Option<Duration>) {
        self.inner
            .tags
            .write()
            .await
            .stored(key.as_str(), ttl, Instant::now());
    }

    /// Consume a deferred invalidation mark, evicting the entry
    ///
    /// Returns the tags the entry had, so a refresh can restore them.
    async fn evict_if_stale(&self, key: &CacheKey) -> Option<Vec<String>> {
        let tags = {
            let mut index = self.inner.tags.write().await;
            if !index.take_stale(key.as_str()) {
                return None;
            }
            let tags = index.tags_for(key.as_str());
            index.remove_key(key.as_str());
            tags
        };

        debug!("Serving stale-marked entry once, then evicting: {}", key);
        if let Err(e) = self.inner.adapter.delete(key.as_str()).await {
            warn!("Failed to evict stale entry {}: {}", key, e);
        }
        Some(tags)
    }

    /// Read a typed value
    ///
    /// A stale-marked entry is returned one last time and evicted.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        match self.read::<T>(key).await? {
            Lookup::Hit(stored) => {
                self.evict_if_stale(key).await;
                Ok(Some(stored.value))
            }
            Lookup::Absent | Lookup::Unusable => {
                self.inner.tags.write().await.take_stale(key.as_str());
                Ok(None)
            }
        }
    }

    /// Read a typed value, fetching and caching it from the origin on a miss
    ///
    /// When the cached value is stale-marked or past its revalidate window it
    /// is still returned, and `fetch` runs in a background task to replace it.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &CacheKey, ttl: Option<Duration>, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.fetch_through(key, Expiry::Ttl(self.default_ttl(ttl)), fetch)
            .await
    }

    /// [`Cache::get_or_fetch`] with the windows of a named TTL profile
    pub async fn get_or_fetch_with_profile<T, F, Fut>(&self, key: &CacheKey, profile: &str, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let windows = self.inner.ttl_policy.resolve(profile)?;
        self.fetch_through(key, Expiry::Profile(windows), fetch).await
    }

    async fn fetch_through<T, F, Fut>(&self, key: &CacheKey, expiry: Expiry, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if let Lookup::Hit(stored) = self.read::<T>(key).await? {
            let stale_tags = self.evict_if_stale(key).await;
            if stale_tags.is_some() || stored.needs_revalidation() {
                self.spawn_refresh(key.clone(), expiry, stale_tags.unwrap_or_default(), fetch)
                    .await;
            }
            return Ok(stored.value);
        }

        self.inner.tags.write().await.take_stale(key.as_str());
        debug!("Cache miss, fetching from origin: {}", key);
        let value = fetch().await.map_err(CacheError::Origin)?;
        if let Err(e) = self.store(key, &value, expiry).await {
            warn!("Failed to cache fetched value for {}: {}", key, e);
        }
        Ok(value)
    }

    async fn spawn_refresh<T, F, Fut>(&self, key: CacheKey, expiry: Expiry, tags: Vec<String>, fetch: F)
    where
        T: Serialize + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if !self.inner.refreshing.lock().await.insert(key.to_string()) {
            debug!("Refresh already running for {}", key);
            return;
        }

        let cache = self.clone();
        tokio::spawn(async move {
            debug!("Background refresh started: {}", key);
            match fetch().await {
                Ok(value) => match cache.store(&key, &value, expiry).await {
                    Ok(()) => {
                        if !tags.is_empty() {
                            cache.tag(&key, tags.as_slice()).await;
                        }
                        debug!("Background refresh completed: {}", key);
                    }
                    Err(e) => warn!("Background refresh could not cache {}: {}", key, e),
                },
                Err(e) => warn!("Background refresh failed for {}: {:#}", key, e),
            }
            cache.inner.refreshing.lock().await.remove(key.as_str());
        });
    }

    async fn store<T: Serialize>(&self, key: &CacheKey, value: &T, expiry: Expiry) -> Result<()> {
        let bytes = codec::encode(value, expiry.revalidate_after())?;
        self.inner.adapter.set(key.as_str(), bytes, expiry.ttl()).await?;
        self.record_store(key, expiry.ttl()).await;
        Ok(())
    }

    /// Store a typed value; `ttl: None` falls back to the configured default
    pub async fn set<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Option<Duration>) -> Result<()> {
        self.store(key, value, Expiry::Ttl(self.default_ttl(ttl))).await
    }

    /// Store a typed value and tag it
    pub async fn set_tagged<T, S>(&self, key: &CacheKey, value: &T, ttl: Option<Duration>, tags: &[S]) -> Result<()>
    where
        T: Serialize,
        S: AsRef<str>,
    {
        self.set(key, value, ttl).await?;
        self.tag(key, tags).await;
        Ok(())
    }

    /// Store a typed value under the windows of a named TTL profile
    pub async fn set_with_profile<T: Serialize>(&self, key: &CacheKey, value: &T, profile: &str) -> Result<()> {
        let windows = self.inner.ttl_policy.resolve(profile)?;
        self.store(key, value, Expiry::Profile(windows)).await
    }

    /// Remove a key and its tag memberships; idempotent
    pub async fn delete(&self, key: &CacheKey) -> Result<()> {
        self.inner.adapter.delete(key.as_str()).await?;
        self.inner.tags.write().await.remove_key(key.as_str());
        Ok(())
    }

    /// Drop every entry and every tag
    pub async fn clear(&self) -> Result<()> {
        self.inner.adapter.clear().await?;
        self.inner.tags.write().await.clear();
        Ok(())
    }

    /// Associate tags with a key
    pub async fn tag<S: AsRef<str>>(&self, key: &CacheKey, tags: &[S]) {
        self.inner.tags.write().await.tag(key.as_str(), tags);
    }

    /// Keys currently tagged with `tag`
    pub async fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        self.inner.tags.read().await.keys_for(tag)
    }

    /// Drop tag memberships of keys that have expired, returning those keys
    ///
    /// Writes prune the index on their own once it grows; this forces a pass.
    pub async fn prune_expired_tags(&self) -> Vec<String> {
        let pruned = self
            .inner
            .tags
            .write()
            .await
            .prune_expired(Instant::now());
        if !pruned.is_empty() {
            debug!("Pruned {} expired keys from the tag index", pruned.len());
        }
        pruned
    }

    /// Invalidate every key tagged with `tag`
    ///
    /// `Immediate` deletes the keys before returning. `Deferred` only marks
    /// them; each is served once more by the next read, then evicted.
    pub async fn invalidate_by_tag(&self, tag: &str, mode: InvalidationMode) -> Result<InvalidationEvent> {
        let event = match mode {
            InvalidationMode::Immediate => {
                let keys = self.inner.tags.read().await.keys_for(tag);

                let mut deleted = Vec::with_capacity(keys.len());
                let mut first_error = None;
                for key in keys {
                    match self.inner.adapter.delete(&key).await {
                        Ok(()) => deleted.push(key),
                        Err(e) => {
                            warn!("Failed to delete {} while invalidating tag {}: {}", key, tag, e);
                            if first_error.is_none() {
                                first_error = Some(e);
                            }
                        }
                    }
                }

                {
                    let mut index = self.inner.tags.write().await;
                    for key in &deleted {
                        index.remove_key(key);
                    }
                }

                if let Some(e) = first_error {
                    return Err(e);
                }
                InvalidationEvent::new(
                    InvalidationReason::TagMatch {
                        tag: tag.to_string(),
                    },
                    deleted,
                )
            }
            InvalidationMode::Deferred => {
                let keys = self.inner.tags.write().await.mark_stale(tag);
                InvalidationEvent::new(
                    InvalidationReason::StaleMarked {
                        tag: tag.to_string(),
                    },
                    keys,
                )
            }
        };

        info!("Invalidated {} keys ({})", event.keys.len(), event.reason);
        Ok(event)
    }

    /// Write to the origin, then cache the result
    pub async fn write_through<T, F, Fut>(&self, key: &CacheKey, write_fn: F, ttl: Option<Duration>) -> Result<T>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let ttl = self.default_ttl(ttl);
        let result = self.inner.write_through.write(key, write_fn, ttl).await?;
        self.record_store(key, ttl).await;
        Ok(result)
    }

    /// Cache `value` now and write it to the origin from the background queue
    pub async fn write_behind<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        write_fn: WriteFn,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let ttl = self.default_ttl(ttl);
        self.inner.write_behind.write(key, value, write_fn, ttl).await?;
        self.record_store(key, ttl).await;
        Ok(())
    }

    /// Drain the write-behind queue, waiting out retry backoffs
    pub async fn flush_all(&self) -> FlushReport {
        self.inner.write_behind.flush_all().await
    }

    pub fn write_behind_stats(&self) -> WriteBehindStats {
        self.inner.write_behind.stats()
    }

    /// The write-behind queue, for inspection
    pub fn write_queue(&self) -> &Arc<WriteQueue> {
        self.inner.write_behind.queue()
    }

    /// Start the periodic write-behind flusher
    pub fn start_write_behind_flusher(&self) -> FlusherHandle {
        self.inner.write_behind.spawn_flusher()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::write_fn;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Product {
        id: u64,
        name: String,
    }

    fn product(id: u64, name: &str) -> Product {
        Product {
            id,
            name: name.to_string(),
        }
    }

    fn cache() -> Cache {
        Cache::new(CacheConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_typed_round_trip_and_metrics() {
        let cache = cache();
        let key = cache.key(&["products", "1"]).unwrap();

        assert_eq!(cache.get::<Product>(&key).await.unwrap(), None);
        cache.set(&key, &product(1, "Widget"), None).await.unwrap();
        assert_eq!(
            cache.get::<Product>(&key).await.unwrap(),
            Some(product(1, "Widget"))
        );

        let metrics = cache.metrics().key_metrics(key.as_str());
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
    }

    #[tokio::test]
    async fn test_wrong_type_degrades_to_miss() {
        let cache = cache();
        let key = cache.key(&["products", "1"]).unwrap();
        cache.set(&key, &"just a string", None).await.unwrap();

        assert_eq!(cache.get::<Product>(&key).await.unwrap(), None);
        assert_eq!(cache.metrics().key_metrics(key.as_str()).errors, 1);
    }

    #[test]
    fn test_remote_backend_requires_store() {
        let config = CacheConfig::builder().backend(BackendKind::Remote).build();
        assert!(matches!(Cache::new(config), Err(CacheError::Config(_))));
    }

    #[tokio::test]
    async fn test_immediate_invalidation_removes_all_memberships() {
        let cache = cache();
        let k1 = cache.key(&["products", "1"]).unwrap();
        let k2 = cache.key(&["products", "2"]).unwrap();

        cache
            .set_tagged(&k1, &product(1, "a"), None, &["products", "products:1"])
            .await
            .unwrap();
        cache
            .set_tagged(&k2, &product(2, "b"), None, &["products", "products:2"])
            .await
            .unwrap();

        let event = cache
            .invalidate_by_tag("products:1", InvalidationMode::Immediate)
            .await
            .unwrap();
        assert_eq!(event.keys, vec![k1.to_string()]);

        assert_eq!(cache.get::<Product>(&k1).await.unwrap(), None);
        assert!(cache.get::<Product>(&k2).await.unwrap().is_some());
        assert_eq!(cache.keys_for_tag("products").await, vec![k2.to_string()]);
    }

    #[tokio::test]
    async fn test_deferred_invalidation_serves_once() {
        let cache = cache();
        let key = cache.key(&["products", "1"]).unwrap();
        cache
            .set_tagged(&key, &product(1, "old"), None, &["products"])
            .await
            .unwrap();

        let event = cache
            .invalidate_by_tag("products", InvalidationMode::Deferred)
            .await
            .unwrap();
        assert_eq!(event.keys, vec![key.to_string()]);

        assert_eq!(
            cache.get::<Product>(&key).await.unwrap(),
            Some(product(1, "old"))
        );
        assert_eq!(cache.get::<Product>(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_deferred_invalidation_refreshes_in_background() {
        let cache = cache();
        let key = cache.key(&["products", "1"]).unwrap();
        cache
            .set_tagged(&key, &product(1, "old"), None, &["products", "products:1"])
            .await
            .unwrap();
        cache
            .invalidate_by_tag("products", InvalidationMode::Deferred)
            .await
            .unwrap();

        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let served = cache
            .get_or_fetch(&key, None, move || async move {
                let _ = done_tx.send(());
                Ok(product(1, "new"))
            })
            .await
            .unwrap();
        assert_eq!(served, product(1, "old"));

        done_rx.await.unwrap();
        // Tags are restored last, once the refreshed value is stored
        for _ in 0..100 {
            if !cache.keys_for_tag("products").await.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }

        let origin_calls = Arc::new(AtomicUsize::new(0));
        let calls = origin_calls.clone();
        let refreshed = cache
            .get_or_fetch(&key, None, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(product(1, "unused"))
            })
            .await
            .unwrap();
        assert_eq!(refreshed, product(1, "new"));
        assert_eq!(origin_calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.keys_for_tag("products").await, vec![key.to_string()]);
    }

    #[tokio::test]
    async fn test_get_or_fetch_miss_populates() {
        let cache = cache();
        let key = cache.key(&["users", "7"]).unwrap();

        let value: String = cache
            .get_or_fetch(&key, None, || async { Ok("from origin".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "from origin");
        assert_eq!(
            cache.get::<String>(&key).await.unwrap(),
            Some("from origin".to_string())
        );

        let err = cache
            .get_or_fetch::<String, _, _>(&cache.key(&["users", "8"]).unwrap(), None, || async {
                anyhow::bail!("origin down")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Origin(_)));
    }

    #[tokio::test]
    async fn test_unknown_profile_propagates() {
        let cache = cache();
        let key = cache.key(&["products", "1"]).unwrap();
        let err = cache
            .set_with_profile(&key, &1u32, "fortnightly")
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::UnknownProfile(_)));

        cache.set_with_profile(&key, &1u32, "hours").await.unwrap();
        assert_eq!(cache.get::<u32>(&key).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_write_behind_through_facade() {
        let cache = cache();
        let key = cache.key(&["orders", "1"]).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        cache
            .write_behind(
                &key,
                &"pending",
                write_fn(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
                None,
            )
            .await
            .unwrap();

        assert_eq!(cache.get::<String>(&key).await.unwrap(), Some("pending".to_string()));
        let report = cache.flush_all().await;
        assert_eq!(report.committed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.write_behind_stats().committed, 1);
    }
}
