//! Benchmarks for the disk cache
//!
//! This benchmark measures:
//! - put/get round trips through the on-disk record format
//! - Cache-header parsing into entries

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use bees_http::cache::{parse_cache_headers, Cache, CacheEntry, DiskCache, Headers};
use bees_http::network::NetworkOutcome;

fn sample_headers() -> Headers {
    let mut headers = Headers::new();
    headers.insert("Content-Type".into(), "application/json; charset=utf-8".into());
    headers.insert("Cache-Control".into(), "max-age=300, stale-while-revalidate=60".into());
    headers.insert("ETag".into(), "\"5f3c-9a1b\"".into());
    headers.insert("Date".into(), "Wed, 21 Oct 2015 07:28:00 GMT".into());
    headers.insert("Last-Modified".into(), "Tue, 20 Oct 2015 07:28:00 GMT".into());
    headers
}

fn bench_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let cache = DiskCache::new(dir.path(), 64 * 1024 * 1024);
    rt.block_on(cache.initialize());

    let mut group = c.benchmark_group("disk_cache_round_trip");
    for size in [256usize, 4 * 1024, 64 * 1024] {
        let entry = CacheEntry::new(vec![b'x'; size])
            .with_etag("\"v1\"")
            .with_headers(sample_headers())
            .with_ttls(1_000, 2_000);
        let key = format!("GET:https://bench.example.com/{}", size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &entry, |b, entry| {
            b.to_async(&rt).iter(|| async {
                cache.put(&key, entry.clone()).await;
                black_box(cache.get(&key).await)
            });
        });
    }
    group.finish();
}

fn bench_parse_cache_headers(c: &mut Criterion) {
    let outcome = NetworkOutcome::new(200, "{}", sample_headers());
    c.bench_function("parse_cache_headers", |b| {
        b.iter(|| black_box(parse_cache_headers(black_box(&outcome))))
    });
}

criterion_group!(benches, bench_round_trip, bench_parse_cache_headers);
criterion_main!(benches);
