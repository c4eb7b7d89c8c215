//! Adapter over a shared remote store (Redis, a KV service, ...)
//!
//! TTL is delegated to the store's native expiry; this adapter only converts
//! durations to whole seconds and maps store failures to [`CacheError::Backend`].

use crate::adapter::{CacheAdapter, Lifetime};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Minimal contract a remote store must satisfy
#[async_trait]
pub trait BackingStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Value plus its remaining TTL (a `GET` + `PTTL` pair on Redis)
    ///
    /// Stores that cannot report a TTL keep the default.
    async fn get_with_ttl(&self, key: &str) -> anyhow::Result<Option<(Vec<u8>, Lifetime)>> {
        Ok(self.get(key).await?.map(|value| (value, Lifetime::Unknown)))
    }

    /// Store bytes; `ttl_seconds: None` stores without expiry
    async fn set_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl_seconds: Option<u64>,
    ) -> anyhow::Result<()>;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    async fn flush_all(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl<S: BackingStore + ?Sized> BackingStore for std::sync::Arc<S> {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn get_with_ttl(&self, key: &str) -> anyhow::Result<Option<(Vec<u8>, Lifetime)>> {
        (**self).get_with_ttl(key).await
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl_seconds: Option<u64>,
    ) -> anyhow::Result<()> {
        (**self).set_with_ttl(key, value, ttl_seconds).await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        (**self).delete(key).await
    }

    async fn flush_all(&self) -> anyhow::Result<()> {
        (**self).flush_all().await
    }
}

/// Cache adapter backed by a [`BackingStore`]
///
/// A namespaced adapter shares its store with other tenants, so `clear` deletes
/// only the keys this adapter wrote instead of flushing the whole store. Keys
/// leave that set when deleted or when a read finds them gone.
pub struct RemoteAdapter<S> {
    store: S,
    namespace: Option<String>,
    written: Mutex<HashSet<String>>,
}

impl<S: BackingStore> RemoteAdapter<S> {
    /// Adapter owning the whole store
    pub fn new(store: S) -> Self {
        Self {
            store,
            namespace: None,
            written: Mutex::new(HashSet::new()),
        }
    }

    /// Adapter sharing the store with other namespaces
    pub fn namespaced(store: S, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: Some(namespace.into()),
            written: Mutex::new(HashSet::new()),
        }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    fn backend_error(op: &str, key: &str, e: anyhow::Error) -> CacheError {
        CacheError::Backend(format!("{} {} failed: {:#}", op, key, e))
    }

    async fn forget(&self, key: &str) {
        if self.namespace.is_some() {
            self.written.lock().await.remove(key);
        }
    }
}

/// Whole seconds, rounded up so a sub-second TTL never becomes "no expiry"
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

#[async_trait]
impl<S: BackingStore> CacheAdapter for RemoteAdapter<S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .store
            .get(key)
            .await
            .map_err(|e| Self::backend_error("GET", key, e))?;
        if value.is_none() {
            self.forget(key).await;
        }
        Ok(value)
    }

    async fn get_with_lifetime(&self, key: &str) -> Result<Option<(Vec<u8>, Lifetime)>> {
        let found = self
            .store
            .get_with_ttl(key)
            .await
            .map_err(|e| Self::backend_error("GET", key, e))?;
        if found.is_none() {
            self.forget(key).await;
        }
        Ok(found)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.store
            .set_with_ttl(key, value, ttl.map(ttl_seconds))
            .await
            .map_err(|e| Self::backend_error("SET", key, e))?;

        if self.namespace.is_some() {
            self.written.lock().await.insert(key.to_string());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store
            .delete(key)
            .await
            .map_err(|e| Self::backend_error("DEL", key, e))?;

        self.forget(key).await;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match &self.namespace {
            None => {
                self.store
                    .flush_all()
                    .await
                    .map_err(|e| Self::backend_error("FLUSHALL", "*", e))?;
                info!("Flushed remote cache store");
            }
            Some(namespace) => {
                // Keys leave the set only once deleted.
                let keys: Vec<String> = self.written.lock().await.iter().cloned().collect();
                for (cleared, key) in keys.iter().enumerate() {
                    if let Err(e) = self.store.delete(key).await {
                        warn!(
                            "Clear of namespace {} stopped after {} of {} keys",
                            namespace,
                            cleared,
                            keys.len()
                        );
                        return Err(Self::backend_error("DEL", key, e));
                    }
                    self.written.lock().await.remove(key);
                }
                info!(
                    "Cleared {} keys of namespace {} from remote cache store",
                    keys.len(),
                    namespace
                );
            }
        }
        debug!("Remote clear complete");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct FakeStore {
        data: Arc<std::sync::Mutex<HashMap<String, (Vec<u8>, Option<u64>)>>>,
        fail: Arc<AtomicBool>,
        /// Key whose DEL is refused
        undeletable: Arc<std::sync::Mutex<Option<String>>>,
    }

    #[async_trait]
    impl BackingStore for FakeStore {
        async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("connection refused");
            }
            Ok(self.data.lock().unwrap().get(key).map(|(v, _)| v.clone()))
        }

        async fn set_with_ttl(
            &self,
            key: &str,
            value: Vec<u8>,
            ttl_seconds: Option<u64>,
        ) -> anyhow::Result<()> {
            self.data
                .lock()
                .unwrap()
                .insert(key.to_string(), (value, ttl_seconds));
            Ok(())
        }

        async fn delete(&self, key: &str) -> anyhow::Result<()> {
            if self.undeletable.lock().unwrap().as_deref() == Some(key) {
                anyhow::bail!("READONLY replica");
            }
            self.data.lock().unwrap().remove(key);
            Ok(())
        }

        async fn flush_all(&self) -> anyhow::Result<()> {
            self.data.lock().unwrap().clear();
            Ok(())
        }
    }

    #[test]
    fn test_ttl_rounding() {
        assert_eq!(ttl_seconds(Duration::from_secs(5)), 5);
        assert_eq!(ttl_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
        assert_eq!(ttl_seconds(Duration::ZERO), 1);
    }

    #[tokio::test]
    async fn test_ttl_delegated_to_store() {
        let store = FakeStore::default();
        let adapter = RemoteAdapter::new(store.clone());

        adapter
            .set("k", b"v".to_vec(), Some(Duration::from_secs(30)))
            .await
            .unwrap();
        adapter.set("forever", b"v".to_vec(), None).await.unwrap();

        let data = store.data.lock().unwrap();
        assert_eq!(data["k"].1, Some(30));
        assert_eq!(data["forever"].1, None);
    }

    #[tokio::test]
    async fn test_store_failure_maps_to_backend_error() {
        let store = FakeStore::default();
        store.fail.store(true, Ordering::SeqCst);
        let adapter = RemoteAdapter::new(store);

        let err = adapter.get("k").await.unwrap_err();
        assert!(err.is_degradable());
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_namespaced_clear_spares_other_tenants() {
        let store = FakeStore::default();
        let tenant_a = RemoteAdapter::namespaced(store.clone(), "a");
        let tenant_b = RemoteAdapter::namespaced(store.clone(), "b");

        tenant_a.set("a:1", b"1".to_vec(), None).await.unwrap();
        tenant_b.set("b:1", b"1".to_vec(), None).await.unwrap();

        tenant_a.clear().await.unwrap();

        assert!(tenant_a.get("a:1").await.unwrap().is_none());
        assert!(tenant_b.get("b:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unscoped_clear_flushes() {
        let store = FakeStore::default();
        let adapter = RemoteAdapter::new(store.clone());
        adapter.set("x", b"1".to_vec(), None).await.unwrap();
        store
            .set_with_ttl("written-elsewhere", b"1".to_vec(), None)
            .await
            .unwrap();

        adapter.clear().await.unwrap();
        assert!(store.data.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_clear_keeps_remaining_keys() {
        let store = FakeStore::default();
        let adapter = RemoteAdapter::namespaced(store.clone(), "a");
        for i in 0..4 {
            adapter
                .set(&format!("a:{}", i), b"v".to_vec(), None)
                .await
                .unwrap();
        }

        *store.undeletable.lock().unwrap() = Some("a:2".to_string());
        let err = adapter.clear().await.unwrap_err();
        assert!(err.to_string().contains("READONLY"));
        assert!(adapter.written.lock().await.contains("a:2"));

        *store.undeletable.lock().unwrap() = None;
        adapter.clear().await.unwrap();
        assert!(store.data.lock().unwrap().is_empty());
        assert!(adapter.written.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_keys_gone_from_store_are_forgotten() {
        let store = FakeStore::default();
        let adapter = RemoteAdapter::namespaced(store.clone(), "a");
        adapter.set("a:1", b"v".to_vec(), None).await.unwrap();
        adapter.set("a:2", b"v".to_vec(), None).await.unwrap();

        // Native expiry, as far as the adapter can tell
        store.data.lock().unwrap().remove("a:1");
        assert!(adapter.get("a:1").await.unwrap().is_none());
        store.data.lock().unwrap().remove("a:2");
        assert!(adapter.get_with_lifetime("a:2").await.unwrap().is_none());

        assert!(adapter.written.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_without_ttl_lookup_reports_unknown() {
        let adapter = RemoteAdapter::new(FakeStore::default());
        adapter
            .set("k", b"v".to_vec(), Some(Duration::from_secs(30)))
            .await
            .unwrap();

        let (_, lifetime) = adapter.get_with_lifetime("k").await.unwrap().unwrap();
        assert_eq!(lifetime, Lifetime::Unknown);
    }
}
