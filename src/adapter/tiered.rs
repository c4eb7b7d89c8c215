//! Two-tier adapter: a local L1 in front of a shared L2

use crate::adapter::{CacheAdapter, Lifetime};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// L1 (usually [`crate::adapter::MemoryAdapter`]) in front of L2 (usually
/// [`crate::adapter::RemoteAdapter`])
///
/// Reads try L1 then L2, backfilling L1 on an L2 hit. A backfilled copy never
/// outlives the L2 entry: its TTL is the L2 remaining lifetime capped at
/// `l1_ttl`, and nothing is backfilled when L2 cannot report that lifetime.
/// Writes, deletes and
/// clears go to both tiers, L2 first so L1 never holds a value L2 rejected.
/// L1 failures are logged and skipped; L2 failures propagate.
pub struct TieredAdapter<L1, L2> {
    l1: L1,
    l2: L2,
    l1_ttl: Duration,
}

impl<L1: CacheAdapter, L2: CacheAdapter> TieredAdapter<L1, L2> {
    /// `l1_ttl` caps how long a value lives in L1, bounding cross-process staleness
    pub fn new(l1: L1, l2: L2, l1_ttl: Duration) -> Self {
        Self { l1, l2, l1_ttl }
    }

    pub fn l1(&self) -> &L1 {
        &self.l1
    }

    pub fn l2(&self) -> &L2 {
        &self.l2
    }

    fn l1_ttl_for(&self, ttl: Option<Duration>) -> Duration {
        ttl.map_or(self.l1_ttl, |ttl| ttl.min(self.l1_ttl))
    }
}

#[async_trait]
impl<L1: CacheAdapter, L2: CacheAdapter> CacheAdapter for TieredAdapter<L1, L2> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get_with_lifetime(key).await?.map(|(value, _)| value))
    }

    async fn get_with_lifetime(&self, key: &str) -> Result<Option<(Vec<u8>, Lifetime)>> {
        match self.l1.get_with_lifetime(key).await {
            Ok(Some(found)) => {
                debug!("L1 hit: {}", key);
                return Ok(Some(found));
            }
            Ok(None) => {}
            Err(e) => warn!("L1 read failed for {}, falling through to L2: {}", key, e),
        }

        let found = self.l2.get_with_lifetime(key).await?;
        if let Some((value, lifetime)) = &found {
            match lifetime.capped(self.l1_ttl) {
                Some(ttl) => {
                    debug!("L2 hit, backfilling L1 for {:?}: {}", ttl, key);
                    if let Err(e) = self.l1.set(key, value.clone(), Some(ttl)).await {
                        warn!("L1 backfill failed for {}: {}", key, e);
                    }
                }
                None => debug!("L2 hit without a known lifetime, skipping L1 backfill: {}", key),
            }
        }
        Ok(found)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.l2.set(key, value.clone(), ttl).await?;
        if let Err(e) = self.l1.set(key, value, Some(self.l1_ttl_for(ttl))).await {
            warn!("L1 write failed for {}: {}", key, e);
            // A stale L1 copy must not outlive the new L2 value.
            if let Err(e) = self.l1.delete(key).await {
                warn!("L1 still holds a superseded value for {}: {}", key, e);
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.l2.delete(key).await?;
        if let Err(e) = self.l1.delete(key).await {
            warn!("L1 delete failed for {}: {}", key, e);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.l2.clear().await?;
        if let Err(e) = self.l1.clear().await {
            warn!("L1 clear failed: {}", e);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tiered"
    }
}
