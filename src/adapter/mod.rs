//! Uniform get/set/delete/clear contract over pluggable backing stores
//!
//! Adapters move raw bytes; typed values are encoded at the [`crate::Cache`]
//! boundary. Every implementation honours the same semantics:
//! - `get` returns `Ok(None)` for absent or expired keys
//! - `set` without a TTL never expires through TTL
//! - `delete` of an absent key is not an error
//! - `clear` drops every entry the adapter owns
//! - `get_with_lifetime` never reports more lifetime than the entry has left

pub mod memory;
pub mod metered;
pub mod remote;
pub mod tiered;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use memory::MemoryAdapter;
pub use metered::MeteredAdapter;
pub use remote::{BackingStore, RemoteAdapter};
pub use tiered::TieredAdapter;

/// Remaining lifetime of a stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Stored without a TTL
    Unbounded,
    /// Expires after this long
    Remaining(Duration),
    /// The backend cannot tell
    Unknown,
}

impl Lifetime {
    /// TTL for a copy that must not outlive the original, capped at `cap`
    ///
    /// `None` when no safe TTL exists.
    pub fn capped(self, cap: Duration) -> Option<Duration> {
        match self {
            Lifetime::Unbounded => Some(cap),
            Lifetime::Remaining(left) if !left.is_zero() => Some(left.min(cap)),
            Lifetime::Remaining(_) | Lifetime::Unknown => None,
        }
    }
}

/// Backend-agnostic cache contract
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    /// Read the bytes stored under `key`
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store bytes under `key`, optionally expiring after `ttl`
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Remove `key`; idempotent
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every entry owned by this adapter
    async fn clear(&self) -> Result<()>;

    /// Read bytes together with their remaining lifetime
    async fn get_with_lifetime(&self, key: &str) -> Result<Option<(Vec<u8>, Lifetime)>> {
        Ok(self.get(key).await?.map(|value| (value, Lifetime::Unknown)))
    }

    /// Short backend name used in log records
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<A: CacheAdapter + ?Sized> CacheAdapter for std::sync::Arc<A> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }

    async fn clear(&self) -> Result<()> {
        (**self).clear().await
    }

    async fn get_with_lifetime(&self, key: &str) -> Result<Option<(Vec<u8>, Lifetime)>> {
        (**self).get_with_lifetime(key).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
