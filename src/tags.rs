//! Tag index and invalidation modes
//!
//! Callers tag entries with both a broad and a specific label
//! (`products`, `products:42`) so either granularity can be invalidated without
//! re-deriving tags from keys. See [`hierarchical_tags`].

use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

/// Deadline count that triggers the first automatic prune
const PRUNE_THRESHOLD: usize = 1024;

/// How `invalidate_by_tag` treats tagged entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationMode {
    /// Delete every tagged key before returning; the next read is a miss
    Immediate,

    /// Mark tagged keys stale; the next read serves the old value once,
    /// evicts it and triggers a refresh
    Deferred,
}

impl FromStr for InvalidationMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "immediate" => Ok(InvalidationMode::Immediate),
            "deferred" => Ok(InvalidationMode::Deferred),
            other => Err(CacheError::Config(format!(
                "unknown invalidation mode: {}",
                other
            ))),
        }
    }
}

/// Reason for cache invalidation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidationReason {
    /// Keys deleted through an immediate tag invalidation
    TagMatch { tag: String },

    /// Keys marked stale through a deferred tag invalidation
    StaleMarked { tag: String },
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationReason::TagMatch { tag } => write!(f, "tag match: {}", tag),
            InvalidationReason::StaleMarked { tag } => write!(f, "marked stale by tag: {}", tag),
        }
    }
}

/// Record of one invalidation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationEvent {
    /// Reason for invalidation
    pub reason: InvalidationReason,

    /// When the invalidation occurred
    pub timestamp: DateTime<Utc>,

    /// Keys that were invalidated
    pub keys: Vec<String>,
}

impl InvalidationEvent {
    pub fn new(reason: InvalidationReason, keys: Vec<String>) -> Self {
        Self {
            reason,
            timestamp: Utc::now(),
            keys,
        }
    }
}

/// Broad and specific tag for a resource, e.g. `["products", "products:42"]`
pub fn hierarchical_tags(resource: &str, id: impl std::fmt::Display) -> [String; 2] {
    [resource.to_string(), format!("{}:{}", resource, id)]
}

/// tag -> keys mapping with its reverse and the set of stale-marked keys
///
/// The index also tracks when each stored key expires. A key's memberships
/// end with the entry: when it is re-stored after its deadline, when a read
/// finds it gone, or when a prune sees its deadline plus `expiry_grace` pass.
#[derive(Debug)]
pub struct TagIndex {
    by_tag: HashMap<String, HashSet<String>>,
    by_key: HashMap<String, HashSet<String>>,
    stale: HashSet<String>,
    deadlines: HashMap<String, Instant>,
    expiry_grace: Duration,
    next_prune: usize,
}

impl Default for TagIndex {
    fn default() -> Self {
        Self {
            by_tag: HashMap::new(),
            by_key: HashMap::new(),
            stale: HashSet::new(),
            deadlines: HashMap::new(),
            expiry_grace: Duration::ZERO,
            next_prune: PRUNE_THRESHOLD,
        }
    }
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index whose prunes wait `grace` past a deadline, for backends that
    /// keep entries slightly longer than asked (whole-second TTLs)
    pub fn with_expiry_grace(grace: Duration) -> Self {
        Self {
            expiry_grace: grace,
            ..Self::default()
        }
    }

    /// Record that `key` was just stored with `ttl`
    ///
    /// Memberships of a previous value that already expired are dropped, and
    /// any stale mark is cleared.
    pub fn stored(&mut self, key: &str, ttl: Option<Duration>, now: Instant) {
        if self.deadlines.get(key).is_some_and(|deadline| *deadline <= now) {
            self.remove_key(key);
        }
        self.stale.remove(key);

        match ttl {
            Some(ttl) => {
                self.deadlines.insert(key.to_string(), now + ttl);
            }
            None => {
                self.deadlines.remove(key);
            }
        }

        if self.deadlines.len() >= self.next_prune {
            self.prune_expired(now);
            self.next_prune = (self.deadlines.len() * 2).max(PRUNE_THRESHOLD);
        }
    }

    /// Forget every key whose deadline passed more than `expiry_grace` ago
    pub fn prune_expired(&mut self, now: Instant) -> Vec<String> {
        let grace = self.expiry_grace;
        let expired: Vec<String> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline + grace <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove_key(key);
        }
        expired
    }

    /// Associate `tags` with `key`
    pub fn tag<T: AsRef<str>>(&mut self, key: &str, tags: &[T]) {
        for tag in tags {
            let tag = tag.as_ref();
            self.by_tag
                .entry(tag.to_string())
                .or_default()
                .insert(key.to_string());
            self.by_key
                .entry(key.to_string())
                .or_default()
                .insert(tag.to_string());
        }
    }

    /// Every key tagged with `tag`, sorted
    pub fn keys_for(&self, tag: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .by_tag
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Every tag of `key`, sorted
    pub fn tags_for(&self, key: &str) -> Vec<String> {
        let mut tags: Vec<String> = self
            .by_key
            .get(key)
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default();
        tags.sort();
        tags
    }

    /// Forget a deleted key under all of its tags
    pub fn remove_key(&mut self, key: &str) {
        if let Some(tags) = self.by_key.remove(key) {
            for tag in tags {
                if let Some(keys) = self.by_tag.get_mut(&tag) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.by_tag.remove(&tag);
                    }
                }
            }
        }
        self.stale.remove(key);
        self.deadlines.remove(key);
    }

    /// Mark every key under `tag` stale, returning them
    pub fn mark_stale(&mut self, tag: &str) -> Vec<String> {
        let keys = self.keys_for(tag);
        self.stale.extend(keys.iter().cloned());
        keys
    }

    pub fn is_stale(&self, key: &str) -> bool {
        self.stale.contains(key)
    }

    /// Clear the stale mark of `key`, returning whether it was set
    pub fn take_stale(&mut self, key: &str) -> bool {
        self.stale.remove(key)
    }

    pub fn clear(&mut self) {
        self.by_tag.clear();
        self.by_key.clear();
        self.stale.clear();
        self.deadlines.clear();
    }

    /// Number of distinct tags
    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}
