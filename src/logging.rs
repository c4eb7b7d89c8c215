//! Tracing setup for binaries and demos
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the application.

use crate::error::{CacheError, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global fmt subscriber filtered by `RUST_LOG`
///
/// `default_filter` (e.g. `"ouroboros_cache=info"`) applies when `RUST_LOG` is
/// unset. Fails if a global subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| CacheError::Config(format!("failed to install tracing subscriber: {}", e)))
}
