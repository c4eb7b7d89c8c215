//! # Ouroboros Cache (ouroboros-cache)
//!
//! A two-tier, tag-addressable key-value cache for async Rust services.
//!
//! ## Features
//!
//! - Pluggable backends behind one [`adapter::CacheAdapter`] contract: in-memory
//!   (lazy TTL, optional LRU), remote (any [`adapter::BackingStore`]) and tiered
//! - Injection-safe, namespaced keys ([`key::build_key`], [`key::CacheKeyBuilder`])
//! - Named freshness profiles with stale / revalidate / expire windows
//! - Write-through and write-behind strategies, the latter with a bounded
//!   in-process queue, per-key ordering and exponential retry backoff
//! - Immediate and deferred (stale-while-revalidate) invalidation by tag
//! - Per-key hit/miss/error metrics recorded by an adapter decorator
//!
//! ## Quick start
//!
//! ```no_run
//! use ouroboros_cache::{Cache, CacheConfig};
//! use ouroboros_cache::write::write_fn;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = Cache::new(CacheConfig::from_env()?)?;
//!     let flusher = cache.start_write_behind_flusher();
//!
//!     let key = cache.key(&["orders", "1001"])?;
//!     cache
//!         .write_behind(&key, &"shipped", write_fn(|| async {
//!             // UPDATE orders SET status = 'shipped' WHERE id = 1001
//!             Ok(())
//!         }), None)
//!         .await?;
//!
//!     let status: Option<String> = cache.get(&key).await?;
//!     println!("Order status: {:?}", status);
//!
//!     flusher.shutdown_on_signal().await;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod cache;
pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod logging;
pub mod metrics;
pub mod tags;
pub mod ttl;
pub mod write;

// Re-export main types for convenience
pub use adapter::{BackingStore, CacheAdapter, Lifetime, MemoryAdapter, MeteredAdapter, RemoteAdapter, TieredAdapter};
pub use cache::Cache;
pub use config::{BackendKind, CacheConfig, CacheConfigBuilder, WriteBehindConfig};
pub use entry::CacheEntry;
pub use error::{CacheError, Result};
pub use key::{build_key, CacheKey, CacheKeyBuilder};
pub use logging::init_tracing;
pub use metrics::{CacheMetrics, CacheStats, KeyMetrics};
pub use tags::{hierarchical_tags, InvalidationEvent, InvalidationMode, InvalidationReason, TagIndex};
pub use ttl::{Freshness, TtlPolicy, TtlProfile, TtlWindows};
pub use write::{write_fn, FlushReport, FlusherHandle, WriteBehind, WriteFn, WriteQueue, WriteThrough};
