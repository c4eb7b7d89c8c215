//! Error types for cache operations
//!
//! Errors fall into three classes:
//! - degradable failures (`Backend`, `Serialization`) that callers treat as a cache miss,
//! - programming errors (`InvalidKey`, `UnknownProfile`, `InvalidTtl`, `Config`) that
//!   must propagate,
//! - signals from the write strategies (`QueueFull`, `Origin`).

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Backing store read/write failure (connection lost, store rejected the command)
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// Stored bytes could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Key construction rejected a namespace or segment
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// TTL profile name not registered
    #[error("Unknown TTL profile: {0}")]
    UnknownProfile(String),

    /// TTL windows violate stale <= revalidate <= expire
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    /// Write-behind queue is at capacity even after a synchronous flush
    #[error("Write-behind queue full: capacity {capacity} reached")]
    QueueFull { capacity: usize },

    /// The origin write failed; the cache was not touched
    #[error("Origin write failed: {0}")]
    Origin(#[source] anyhow::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Whether the error only degrades the cache to a miss.
    ///
    /// Backend and serialization failures never make the origin inconsistent,
    /// so callers fall back to the origin instead of failing.
    pub fn is_degradable(&self) -> bool {
        matches!(self, CacheError::Backend(_) | CacheError::Serialization(_))
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}
