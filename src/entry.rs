//! Cache entry held by the in-memory adapter

use crate::key::CacheKey;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// A stored value with its expiry deadline
///
/// `expires_at` is on the monotonic clock; `None` means no TTL.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cache key
    pub key: String,

    /// Serialized value
    pub value: Vec<u8>,

    /// Wall-clock creation time
    pub created_at: DateTime<Utc>,

    /// Monotonic expiry deadline
    pub expires_at: Option<Instant>,

    /// Last access (for LRU tracking)
    pub accessed_at: Instant,

    /// Number of reads served from this entry
    pub access_count: u64,
}

impl CacheEntry {
    /// Create a new entry; `ttl: None` never expires
    pub fn new(key: impl Into<String>, value: Vec<u8>, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            key: key.into(),
            value,
            created_at: Utc::now(),
            expires_at: ttl.map(|ttl| now + ttl),
            accessed_at: now,
            access_count: 0,
        }
    }

    /// Create an entry for a validated key
    pub fn for_key(key: &CacheKey, value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self::new(key.as_str(), value, ttl)
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub(crate) fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    /// Time until expiration, `None` if expired or without TTL
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let deadline = self.expires_at?;
        let now = Instant::now();
        (now < deadline).then(|| deadline - now)
    }

    /// Mark the entry as accessed (updates access time and count)
    pub fn mark_accessed(&mut self) {
        self.accessed_at = Instant::now();
        self.access_count += 1;
    }

    /// Approximate memory footprint of the entry
    pub fn size_bytes(&self) -> usize {
        self.key.len() + self.value.len() + std::mem::size_of::<Self>()
    }
}
