//! Tag invalidation demo
//!
//! Caches a small product catalogue with hierarchical tags, then invalidates
//! it immediately by id and deferred (stale-while-revalidate) by category.
//!
//! Run with: cargo run --example tag_invalidation_demo

use ouroboros_cache::{hierarchical_tags, init_tracing, Cache, CacheConfig, InvalidationMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Product {
    id: u64,
    name: String,
    price_cents: u64,
}

async fn load_from_origin(id: u64) -> anyhow::Result<Product> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(Product {
        id,
        name: format!("Product #{}", id),
        price_cents: 1_000 + id,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("ouroboros_cache=info,tag_invalidation_demo=info")?;

    info!("=== Tag Invalidation Demo ===");

    let cache = Cache::new(CacheConfig::default())?;

    for id in 1..=3u64 {
        let key = cache.key(&["products".to_string(), id.to_string()])?;
        let product = load_from_origin(id).await?;
        cache
            .set_with_profile(&key, &product, "hours")
            .await?;
        cache.tag(&key, &hierarchical_tags("products", id)).await;
    }
    info!("Tagged keys: {:?}", cache.keys_for_tag("products").await);

    info!("\n--- Immediate invalidation of products:2 ---");
    let event = cache
        .invalidate_by_tag("products:2", InvalidationMode::Immediate)
        .await?;
    info!("{}: {:?}", event.reason, event.keys);

    let key2 = cache.key(&["products", "2"])?;
    let product: Product = cache
        .get_or_fetch(&key2, None, || load_from_origin(2))
        .await?;
    info!("Reloaded after miss: {:?}", product);

    info!("\n--- Deferred invalidation of products ---");
    let event = cache
        .invalidate_by_tag("products", InvalidationMode::Deferred)
        .await?;
    info!("{}: {:?}", event.reason, event.keys);

    let key1 = cache.key(&["products", "1"])?;
    let served: Product = cache
        .get_or_fetch(&key1, None, || load_from_origin(1))
        .await?;
    info!("Served stale value once: {:?}", served);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let refreshed: Option<Product> = cache.get(&key1).await?;
    info!("After background refresh: {:?}", refreshed);

    info!("Cache stats: {}", cache.stats());
    Ok(())
}
