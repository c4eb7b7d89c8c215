//! Per-key hit/miss/error bookkeeping
//!
//! Used to validate TTL choices: a key with a low hit rate under a long profile
//! is a sign the profile is wrong (or the key is not reused at all).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Counters for a single key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetrics {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

impl KeyMetrics {
    /// Hit rate in `0.0..=1.0`; `0.0` when the key was never read
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Aggregate statistics across all keys
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStats {
    /// Total number of cache hits
    pub hits: u64,

    /// Total number of cache misses
    pub misses: u64,

    /// Total number of backend or decode errors
    pub errors: u64,

    /// Number of distinct keys observed
    pub tracked_keys: usize,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, errors: {}, hit_rate: {:.2}%, keys: {} }}",
            self.hits,
            self.misses,
            self.errors,
            self.hit_rate(),
            self.tracked_keys
        )
    }
}

/// Process-wide metrics collector
///
/// Never panics: a poisoned lock is recovered since the counters stay
/// meaningful after a panic elsewhere.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    counters: Mutex<HashMap<String, KeyMetrics>>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, key: &str) {
        self.update(key, |m| m.hits += 1);
    }

    pub fn record_miss(&self, key: &str) {
        self.update(key, |m| m.misses += 1);
    }

    pub fn record_error(&self, key: &str) {
        self.update(key, |m| m.errors += 1);
    }

    /// Hit rate of a key in `0.0..=1.0`
    pub fn hit_rate(&self, key: &str) -> f64 {
        self.key_metrics(key).hit_rate()
    }

    /// Counters of a key (zeroed if never observed)
    pub fn key_metrics(&self, key: &str) -> KeyMetrics {
        self.lock().get(key).copied().unwrap_or_default()
    }

    /// Aggregate snapshot over all keys
    pub fn stats(&self) -> CacheStats {
        let counters = self.lock();
        counters.values().fold(
            CacheStats {
                tracked_keys: counters.len(),
                ..Default::default()
            },
            |mut acc, m| {
                acc.hits += m.hits;
                acc.misses += m.misses;
                acc.errors += m.errors;
                acc
            },
        )
    }

    /// Drop every counter
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn update(&self, key: &str, f: impl FnOnce(&mut KeyMetrics)) {
        let mut counters = self.lock();
        match counters.get_mut(key) {
            Some(m) => f(m),
            None => {
                let mut m = KeyMetrics::default();
                f(&mut m);
                counters.insert(key.to_string(), m);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, KeyMetrics>> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }
}
