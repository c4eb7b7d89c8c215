use criterion::{criterion_group, criterion_main, Criterion};
use ouroboros_cache::{build_key, Cache, CacheConfig};
use std::hint::black_box;

fn bench_key_building(c: &mut Criterion) {
    c.bench_function("key/build_three_segments", |b| {
        b.iter(|| {
            let key = build_key(black_box("app"), &["Products", "42", "reviews"]).expect("valid key");
            black_box(key);
        });
    });
}

fn bench_memory_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let cache = Cache::new(CacheConfig::default()).expect("memory cache");
    let key = cache.key(&["products", "42"]).expect("valid key");

    rt.block_on(async {
        cache.set(&key, &"Widget".to_string(), None).await.expect("set");
    });

    c.bench_function("cache/get_hit", |b| {
        b.to_async(&rt).iter(|| async {
            let value: Option<String> = cache.get(&key).await.expect("get");
            black_box(value);
        });
    });

    c.bench_function("cache/set", |b| {
        b.to_async(&rt).iter(|| async {
            cache
                .set(&key, black_box(&"Widget".to_string()), None)
                .await
                .expect("set");
        });
    });
}

fn bench_tag_invalidation(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let cache = Cache::new(CacheConfig::default()).expect("memory cache");

    c.bench_function("tags/invalidate_100_keys", |b| {
        b.to_async(&rt).iter(|| async {
            for id in 0..100u32 {
                let key = cache.key(&["products".to_string(), id.to_string()]).expect("valid key");
                cache
                    .set_tagged(&key, &id, None, &["products"])
                    .await
                    .expect("set");
            }
            let event = cache
                .invalidate_by_tag("products", ouroboros_cache::InvalidationMode::Immediate)
                .await
                .expect("invalidate");
            black_box(event.keys.len());
        });
    });
}

criterion_group!(
    benches,
    bench_key_building,
    bench_memory_round_trip,
    bench_tag_invalidation
);
criterion_main!(benches);
