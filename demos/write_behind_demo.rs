//! Write-behind demo
//!
//! Queues order updates against a flaky in-memory "database", lets the
//! background flusher retry them, then shuts down with a final flush.
//!
//! Run with: cargo run --example write_behind_demo

use ouroboros_cache::write::write_fn;
use ouroboros_cache::{init_tracing, Cache, CacheConfig, WriteBehindConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

/// Stand-in for a database that rejects every other write
#[derive(Clone, Default)]
struct FlakyDatabase {
    rows: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<AtomicUsize>,
}

impl FlakyDatabase {
    fn update(&self, key: String, status: &'static str) -> ouroboros_cache::WriteFn {
        let db = self.clone();
        write_fn(move || {
            let db = db.clone();
            let key = key.clone();
            async move {
                if db.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                    anyhow::bail!("could not obtain row lock");
                }
                db.rows
                    .lock()
                    .map_err(|_| anyhow::anyhow!("database poisoned"))?
                    .insert(key, status.to_string());
                Ok(())
            }
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("ouroboros_cache=debug,write_behind_demo=info")?;

    info!("=== Write-Behind Demo ===");

    let config = CacheConfig::builder()
        .namespace("shop")
        .write_behind(WriteBehindConfig {
            flush_interval: Duration::from_millis(500),
            ..Default::default()
        })
        .build();
    let cache = Cache::new(config)?;
    let flusher = cache.start_write_behind_flusher();
    let db = FlakyDatabase::default();

    for (id, status) in [("1001", "paid"), ("1002", "shipped"), ("1003", "delivered")] {
        let key = cache.key(&["orders", id])?;
        cache
            .write_behind(&key, &status, db.update(key.to_string(), status), None)
            .await?;
        let cached: Option<String> = cache.get(&key).await?;
        info!("{} cached immediately as {:?}", key, cached);
    }

    info!("Queued writes: {}", cache.write_queue().len().await);

    tokio::time::sleep(Duration::from_secs(2)).await;

    flusher.shutdown().await;

    let stats = cache.write_behind_stats();
    info!(
        "Write-behind stats: {} enqueued, {} committed, {} requeued, {} dropped",
        stats.enqueued, stats.committed, stats.requeued, stats.dropped
    );
    let rows = db
        .rows
        .lock()
        .map_err(|_| anyhow::anyhow!("database poisoned"))?
        .clone();
    info!("Database rows: {:?}", rows);
    info!("Cache stats: {}", cache.stats());

    Ok(())
}
