//! Decorator recording hits, misses and errors of any adapter

use crate::adapter::{CacheAdapter, Lifetime};
use crate::error::Result;
use crate::metrics::CacheMetrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Wraps an adapter and feeds every outcome into [`CacheMetrics`]
pub struct MeteredAdapter<A> {
    inner: A,
    metrics: Arc<CacheMetrics>,
}

impl<A: CacheAdapter> MeteredAdapter<A> {
    pub fn new(inner: A, metrics: Arc<CacheMetrics>) -> Self {
        Self { inner, metrics }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    fn observe<T>(&self, key: &str, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.metrics.record_error(key);
        }
        result
    }

    fn observe_read<T>(&self, key: &str, result: &Result<Option<T>>) {
        match result {
            Ok(Some(_)) => self.metrics.record_hit(key),
            Ok(None) => self.metrics.record_miss(key),
            Err(_) => self.metrics.record_error(key),
        }
    }
}

#[async_trait]
impl<A: CacheAdapter> CacheAdapter for MeteredAdapter<A> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let result = self.inner.get(key).await;
        self.observe_read(key, &result);
        result
    }

    async fn get_with_lifetime(&self, key: &str) -> Result<Option<(Vec<u8>, Lifetime)>> {
        let result = self.inner.get_with_lifetime(key).await;
        self.observe_read(key, &result);
        result
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let result = self.inner.set(key, value, ttl).await;
        self.observe(key, result)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let result = self.inner.delete(key).await;
        self.observe(key, result)
    }

    async fn clear(&self) -> Result<()> {
        let result = self.inner.clear().await;
        self.observe("*", result)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
