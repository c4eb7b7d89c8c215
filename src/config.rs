//! Configuration for the cache and its write-behind queue

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Backing store selected at construction time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local map
    Memory,
    /// Shared remote store only
    Remote,
    /// Process-local L1 in front of a shared L2
    Tiered,
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "remote" => Ok(BackendKind::Remote),
            "tiered" => Ok(BackendKind::Tiered),
            other => Err(CacheError::Config(format!("unknown backend: {}", other))),
        }
    }
}

/// Tuning of the write-behind queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteBehindConfig {
    /// Interval of the background flusher
    pub flush_interval: Duration,

    /// Attempts per pending write before it is dropped
    pub max_retries: u32,

    /// Queue capacity; beyond it writes fail with `QueueFull`
    pub max_queue_size: usize,

    /// Delay before the first retry, doubled on each further failure
    pub retry_backoff: Duration,

    /// Upper bound on the retry delay
    pub max_backoff: Duration,
}

impl Default for WriteBehindConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(5),
            max_retries: 3,
            max_queue_size: 1_000,
            retry_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl WriteBehindConfig {
    /// Delay before the next attempt of a write that has failed `retries` times
    pub fn backoff_for(&self, retries: u32) -> Duration {
        let exponent = retries.saturating_sub(1).min(16);
        self.retry_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Configuration for the cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Namespace prefix shared by every key of this cache
    pub namespace: String,

    /// Backing store kind
    pub backend: BackendKind,

    /// TTL applied when a write does not specify one; `None` never expires
    pub default_ttl: Option<Duration>,

    /// TTL jitter factor (0.0 - 1.0) applied to `default_ttl`
    /// Spreads expiry of entries written together to prevent stampedes
    pub ttl_jitter: f64,

    /// Entry limit of the in-memory tier (LRU eviction beyond it)
    pub max_entries: Option<usize>,

    /// How long the L1 copy of a tiered cache may live
    pub l1_ttl: Duration,

    /// Write-behind queue tuning
    pub write_behind: WriteBehindConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "app".to_string(),
            backend: BackendKind::Memory,
            default_ttl: None,
            ttl_jitter: 0.0,
            max_entries: None,
            l1_ttl: Duration::from_secs(60),
            write_behind: WriteBehindConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        crate::key::normalize_segment(&self.namespace)
            .map_err(|e| CacheError::Config(format!("namespace: {}", e)))?;

        if self.ttl_jitter < 0.0 || self.ttl_jitter > 1.0 {
            return Err(CacheError::Config(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.max_entries == Some(0) {
            return Err(CacheError::Config(
                "max_entries must be greater than 0".to_string(),
            ));
        }

        if self.l1_ttl.is_zero() {
            return Err(CacheError::Config(
                "l1_ttl must be greater than 0".to_string(),
            ));
        }

        let wb = &self.write_behind;
        if wb.max_retries == 0 {
            return Err(CacheError::Config(
                "write_behind.max_retries must be greater than 0".to_string(),
            ));
        }
        if wb.max_queue_size == 0 {
            return Err(CacheError::Config(
                "write_behind.max_queue_size must be greater than 0".to_string(),
            ));
        }
        if wb.flush_interval.is_zero() {
            return Err(CacheError::Config(
                "write_behind.flush_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// TTL for a write that did not specify one, jitter applied
    pub fn ttl_with_jitter(&self) -> Option<Duration> {
        let base = self.default_ttl?;
        if self.ttl_jitter == 0.0 {
            return Some(base);
        }

        let base_secs = base.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).max(1.0);

        Some(Duration::from_secs_f64(final_secs))
    }

    /// Load configuration from `CACHE_*` environment variables
    ///
    /// A `.env` file in the working directory is read first when present.
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn parse<T: FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            name: &str,
        ) -> Result<Option<T>> {
            match lookup(name) {
                None => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| CacheError::Config(format!("{} has an invalid value", name))),
            }
        }

        let mut builder = CacheConfig::builder();

        if let Some(namespace) = lookup("CACHE_NAMESPACE") {
            builder = builder.namespace(namespace);
        }
        if let Some(backend) = lookup("CACHE_BACKEND") {
            builder = builder.backend(backend.parse()?);
        }
        if let Some(secs) = parse::<u64>(&lookup, "CACHE_DEFAULT_TTL_SECS")? {
            builder = builder.default_ttl(Duration::from_secs(secs));
        }
        if let Some(jitter) = parse::<f64>(&lookup, "CACHE_TTL_JITTER")? {
            builder = builder.ttl_jitter(jitter);
        }
        if let Some(max) = parse::<usize>(&lookup, "CACHE_MAX_ENTRIES")? {
            builder = builder.max_entries(max);
        }
        if let Some(secs) = parse::<u64>(&lookup, "CACHE_L1_TTL_SECS")? {
            builder = builder.l1_ttl(Duration::from_secs(secs));
        }

        let mut write_behind = WriteBehindConfig::default();
        if let Some(ms) = parse::<u64>(&lookup, "CACHE_FLUSH_INTERVAL_MS")? {
            write_behind.flush_interval = Duration::from_millis(ms);
        }
        if let Some(retries) = parse::<u32>(&lookup, "CACHE_MAX_RETRIES")? {
            write_behind.max_retries = retries;
        }
        if let Some(size) = parse::<usize>(&lookup, "CACHE_MAX_QUEUE_SIZE")? {
            write_behind.max_queue_size = size;
        }
        if let Some(ms) = parse::<u64>(&lookup, "CACHE_RETRY_BACKOFF_MS")? {
            write_behind.retry_backoff = Duration::from_millis(ms);
        }

        let config = builder.write_behind(write_behind).build();
        config.validate()?;
        Ok(config)
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    namespace: Option<String>,
    backend: Option<BackendKind>,
    default_ttl: Option<Duration>,
    ttl_jitter: Option<f64>,
    max_entries: Option<usize>,
    l1_ttl: Option<Duration>,
    write_behind: Option<WriteBehindConfig>,
}

impl CacheConfigBuilder {
    /// Set the key namespace
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Select the backing store kind
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set default TTL for cache entries
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Set maximum number of in-memory entries
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Set the L1 lifetime of a tiered cache
    pub fn l1_ttl(mut self, ttl: Duration) -> Self {
        self.l1_ttl = Some(ttl);
        self
    }

    /// Set write-behind queue tuning
    pub fn write_behind(mut self, config: WriteBehindConfig) -> Self {
        self.write_behind = Some(config);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            namespace: self.namespace.unwrap_or(defaults.namespace),
            backend: self.backend.unwrap_or(defaults.backend),
            default_ttl: self.default_ttl.or(defaults.default_ttl),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            max_entries: self.max_entries.or(defaults.max_entries),
            l1_ttl: self.l1_ttl.unwrap_or(defaults.l1_ttl),
            write_behind: self.write_behind.unwrap_or(defaults.write_behind),
        }
    }
}

/// Preset configurations for common use cases
impl CacheConfig {
    /// Rapidly changing data: 5 minute default TTL with 15% jitter
    pub fn realtime() -> Self {
        Self {
            default_ttl: Some(Duration::from_secs(300)),
            ttl_jitter: 0.15,
            max_entries: Some(5_000),
            ..Default::default()
        }
    }

    /// Memory-constrained processes
    pub fn small() -> Self {
        Self {
            default_ttl: Some(Duration::from_secs(1800)),
            ttl_jitter: 0.15,
            max_entries: Some(1_000),
            write_behind: WriteBehindConfig {
                max_queue_size: 100,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.namespace, "app");
        assert_eq!(config.backend, BackendKind::Memory);
        assert!(config.default_ttl.is_none());
        assert_eq!(config.write_behind.flush_interval, Duration::from_secs(5));
        assert_eq!(config.write_behind.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut invalid = CacheConfig::default();
        invalid.max_entries = Some(0);
        assert!(invalid.validate().is_err());

        let mut invalid = CacheConfig::default();
        invalid.ttl_jitter = 1.5;
        assert!(invalid.validate().is_err());

        let mut invalid = CacheConfig::default();
        invalid.namespace = "tenant a".to_string();
        assert!(matches!(invalid.validate(), Err(CacheError::Config(_))));

        let mut invalid = CacheConfig::default();
        invalid.write_behind.max_queue_size = 0;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::builder()
            .namespace("shop")
            .backend(BackendKind::Tiered)
            .default_ttl(Duration::from_secs(600))
            .max_entries(5000)
            .build();

        assert_eq!(config.namespace, "shop");
        assert_eq!(config.backend, BackendKind::Tiered);
        assert_eq!(config.default_ttl, Some(Duration::from_secs(600)));
        assert_eq!(config.max_entries, Some(5000));
    }

    #[test]
    fn test_ttl_with_jitter() {
        let config = CacheConfig {
            default_ttl: Some(Duration::from_secs(3600)),
            ttl_jitter: 0.1,
            ..Default::default()
        };

        let ttl = config.ttl_with_jitter().unwrap();
        assert!(ttl.as_secs_f64() >= 3600.0 - 360.0);
        assert!(ttl.as_secs_f64() <= 3600.0 + 360.0);

        assert!(CacheConfig::default().ttl_with_jitter().is_none());
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let wb = WriteBehindConfig::default();
        assert_eq!(wb.backoff_for(1), Duration::from_millis(100));
        assert_eq!(wb.backoff_for(2), Duration::from_millis(200));
        assert_eq!(wb.backoff_for(3), Duration::from_millis(400));
        assert_eq!(wb.backoff_for(30), Duration::from_secs(5));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CACHE_NAMESPACE", "shop"),
            ("CACHE_BACKEND", "tiered"),
            ("CACHE_DEFAULT_TTL_SECS", "120"),
            ("CACHE_MAX_QUEUE_SIZE", "50"),
            ("CACHE_FLUSH_INTERVAL_MS", "250"),
        ]);
        let config =
            CacheConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(config.namespace, "shop");
        assert_eq!(config.backend, BackendKind::Tiered);
        assert_eq!(config.default_ttl, Some(Duration::from_secs(120)));
        assert_eq!(config.write_behind.max_queue_size, 50);
        assert_eq!(config.write_behind.flush_interval, Duration::from_millis(250));
        assert_eq!(config.write_behind.max_retries, 3);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = CacheConfig::from_lookup(|name| {
            (name == "CACHE_MAX_RETRIES").then(|| "many".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("CACHE_MAX_RETRIES"));

        assert!(CacheConfig::from_lookup(|name| {
            (name == "CACHE_BACKEND").then(|| "floppy".to_string())
        })
        .is_err());
    }

    #[test]
    fn test_preset_configs() {
        assert_eq!(
            CacheConfig::realtime().default_ttl,
            Some(Duration::from_secs(300))
        );
        assert_eq!(CacheConfig::small().max_entries, Some(1_000));
        assert!(CacheConfig::realtime().validate().is_ok());
        assert!(CacheConfig::small().validate().is_ok());
    }
}
