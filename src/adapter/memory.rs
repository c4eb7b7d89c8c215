//! In-process adapter with lazy TTL expiry and optional LRU eviction

use crate::adapter::{CacheAdapter, Lifetime};
use crate::entry::CacheEntry;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

/// Counters specific to the in-memory backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Entries currently held, expired-but-unread ones included
    pub entries: usize,

    /// Approximate bytes held
    pub size_bytes: usize,

    /// Entries dropped because their TTL passed
    pub evictions_ttl: u64,

    /// Entries dropped by the LRU policy
    pub evictions_size: u64,
}

/// In-memory cache adapter
///
/// Expiry is lazy: an expired entry stays in the map until the next `get`
/// (or [`MemoryAdapter::cleanup_expired`]) observes it.
pub struct MemoryAdapter {
    store: RwLock<MemoryStore>,
    max_entries: Option<usize>,
}

struct MemoryStore {
    /// Main storage: key -> entry
    entries: HashMap<String, CacheEntry>,

    /// LRU tracking: front is least recently used
    lru_queue: VecDeque<String>,

    evictions_ttl: u64,
    evictions_size: u64,
}

impl MemoryStore {
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru_queue.retain(|k| k != key);
        Some(entry)
    }

    fn touch(&mut self, key: &str) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.to_string());
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdapter {
    /// Unbounded adapter
    pub fn new() -> Self {
        Self {
            store: RwLock::new(MemoryStore {
                entries: HashMap::new(),
                lru_queue: VecDeque::new(),
                evictions_ttl: 0,
                evictions_size: 0,
            }),
            max_entries: None,
        }
    }

    /// Adapter evicting the least recently used entry beyond `max_entries`
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries.max(1)),
            ..Self::new()
        }
    }

    /// Number of entries held, including expired ones not yet observed
    pub async fn len(&self) -> usize {
        self.store.read().await.entries.len()
    }

    /// Check if the adapter holds no entries
    pub async fn is_empty(&self) -> bool {
        self.store.read().await.entries.is_empty()
    }

    /// Remove all expired entries, returning their keys
    pub async fn cleanup_expired(&self) -> Vec<String> {
        let mut store = self.store.write().await;
        let now = Instant::now();

        let expired: Vec<String> = store
            .entries
            .values()
            .filter(|e| e.is_expired_at(now))
            .map(|e| e.key.clone())
            .collect();

        for key in &expired {
            store.remove_entry(key);
        }
        store.evictions_ttl += expired.len() as u64;

        if !expired.is_empty() {
            debug!("Cleaned up {} expired entries", expired.len());
        }
        expired
    }

    /// Snapshot of backend counters
    pub async fn stats(&self) -> MemoryStats {
        let store = self.store.read().await;
        MemoryStats {
            entries: store.entries.len(),
            size_bytes: store.entries.values().map(CacheEntry::size_bytes).sum(),
            evictions_ttl: store.evictions_ttl,
            evictions_size: store.evictions_size,
        }
    }

    fn evict_if_needed(&self, store: &mut MemoryStore) {
        let Some(max) = self.max_entries else {
            return;
        };

        while store.entries.len() >= max {
            match store.lru_queue.pop_front() {
                Some(key) => {
                    debug!("Evicting entry due to max_entries limit: {}", key);
                    store.entries.remove(&key);
                    store.evictions_size += 1;
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl CacheAdapter for MemoryAdapter {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get_with_lifetime(key).await?.map(|(value, _)| value))
    }

    async fn get_with_lifetime(&self, key: &str) -> Result<Option<(Vec<u8>, Lifetime)>> {
        let mut store = self.store.write().await;
        let now = Instant::now();

        let lifetime = match store.entries.get_mut(key) {
            None => return Ok(None),
            Some(entry) if entry.is_expired_at(now) => None,
            Some(entry) => {
                entry.mark_accessed();
                Some(match entry.expires_at {
                    Some(deadline) => Lifetime::Remaining(deadline - now),
                    None => Lifetime::Unbounded,
                })
            }
        };

        let Some(lifetime) = lifetime else {
            debug!("Cache entry expired: {}", key);
            store.remove_entry(key);
            store.evictions_ttl += 1;
            return Ok(None);
        };

        if self.max_entries.is_some() {
            store.touch(key);
        }
        Ok(store.entries.get(key).map(|e| (e.value.clone(), lifetime)))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry::new(key, value, ttl);
        let mut store = self.store.write().await;

        match store.entries.get_mut(key) {
            Some(existing) => *existing = entry,
            None => {
                self.evict_if_needed(&mut store);
                store.entries.insert(key.to_string(), entry);
            }
        }

        if self.max_entries.is_some() {
            store.touch(key);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut store = self.store.write().await;
        if store.remove_entry(key).is_some() {
            debug!("Removed cache entry: {}", key);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut store = self.store.write().await;
        let count = store.entries.len();
        store.entries.clear();
        store.lru_queue.clear();

        info!("Cleared {} entries from memory cache", count);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_set_and_get() {
        let adapter = MemoryAdapter::new();
        adapter.set("key1", b"value1".to_vec(), None).await.unwrap();

        let value = adapter.get("key1").await.unwrap();
        assert_eq!(value, Some(b"value1".to_vec()));
        assert_eq!(adapter.get("missing").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_ttl_expiration() {
        let adapter = MemoryAdapter::new();
        adapter
            .set("app:products:42", b"42".to_vec(), Some(Duration::from_secs(5)))
            .await
            .unwrap();

        assert!(adapter.get("app:products:42").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(6)).await;

        // Still physically present until a read observes it
        assert_eq!(adapter.len().await, 1);
        assert!(adapter.get("app:products:42").await.unwrap().is_none());
        assert_eq!(adapter.len().await, 0);
        assert_eq!(adapter.stats().await.evictions_ttl, 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let adapter = MemoryAdapter::new();
        adapter.set("key1", b"v".to_vec(), None).await.unwrap();

        adapter.delete("key1").await.unwrap();
        adapter.delete("key1").await.unwrap();
        assert!(adapter.get("key1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear() {
        let adapter = MemoryAdapter::new();
        adapter.set("key1", b"1".to_vec(), None).await.unwrap();
        adapter.set("key2", b"2".to_vec(), None).await.unwrap();

        adapter.clear().await.unwrap();

        assert!(adapter.is_empty().await);
        assert!(adapter.get("key1").await.unwrap().is_none());
        assert!(adapter.get("key2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let adapter = MemoryAdapter::with_max_entries(3);

        adapter.set("key1", b"1".to_vec(), None).await.unwrap();
        adapter.set("key2", b"2".to_vec(), None).await.unwrap();
        adapter.set("key3", b"3".to_vec(), None).await.unwrap();

        // key1 becomes most recently used
        adapter.get("key1").await.unwrap();

        adapter.set("key4", b"4".to_vec(), None).await.unwrap();

        assert!(adapter.get("key2").await.unwrap().is_none());
        assert!(adapter.get("key1").await.unwrap().is_some());
        assert!(adapter.get("key3").await.unwrap().is_some());
        assert!(adapter.get("key4").await.unwrap().is_some());
        assert_eq!(adapter.stats().await.evictions_size, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired() {
        let adapter = MemoryAdapter::new();
        adapter
            .set("k1", b"1".to_vec(), Some(Duration::from_millis(50)))
            .await
            .unwrap();
        adapter
            .set("k2", b"2".to_vec(), Some(Duration::from_millis(50)))
            .await
            .unwrap();
        adapter.set("k3", b"3".to_vec(), None).await.unwrap();

        tokio::time::advance(Duration::from_millis(100)).await;

        let mut expired = adapter.cleanup_expired().await;
        expired.sort();
        assert_eq!(expired, vec!["k1".to_string(), "k2".to_string()]);
        assert_eq!(adapter.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifetime_reports_time_left() {
        let adapter = MemoryAdapter::new();
        adapter
            .set("k", b"v".to_vec(), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        adapter.set("forever", b"v".to_vec(), None).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;

        let (_, lifetime) = adapter.get_with_lifetime("k").await.unwrap().unwrap();
        assert_eq!(lifetime, Lifetime::Remaining(Duration::from_secs(1)));
        let (_, lifetime) = adapter.get_with_lifetime("forever").await.unwrap().unwrap();
        assert_eq!(lifetime, Lifetime::Unbounded);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(adapter.get_with_lifetime("k").await.unwrap().is_none());
    }
}
