use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tilecache::{LruContainer, MemoryCache};

fn filled(n: u64) -> LruContainer<u64, u64> {
    let mut lru = LruContainer::with_capacity(n as usize);
    for key in 0..n {
        lru.insert(key, key, false);
    }
    lru
}

fn bench_lru_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lru_lookup");

    for size in [1_000u64, 100_000] {
        let mut lru = filled(size);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut key = 0;
            b.iter(|| {
                key = (key + 7919) % size;
                black_box(lru.lookup(&key));
            });
        });
    }

    group.finish();
}

fn bench_lru_insert_evict(c: &mut Criterion) {
    let mut group = c.benchmark_group("lru_insert_evict");

    for size in [1_000u64, 100_000] {
        let mut lru = filled(size);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut key = size;
            b.iter(|| {
                key += 1;
                black_box(lru.insert(key, key, true));
            });
        });
    }

    group.finish();
}

fn bench_memory_cache_add(c: &mut Criterion) {
    let cache = MemoryCache::new(64 * 1024 * 1024);
    let tile = vec![0u8; 16 * 1024];

    c.bench_function("memory_cache_add_16k", |b| {
        let mut key = 0u64;
        b.iter(|| {
            key += 1;
            black_box(cache.add_bytes(key, tile.clone()));
        });
    });
}

fn bench_memory_cache_hit(c: &mut Criterion) {
    let cache = MemoryCache::new(0);
    for key in 0..1024u64 {
        cache.add_bytes(key, vec![0u8; 256]);
    }

    c.bench_function("memory_cache_hit", |b| {
        let mut key = 0u64;
        b.iter(|| {
            key = (key + 1) % 1024;
            black_box(cache.is_cached(key).is_some());
        });
    });
}

criterion_group!(
    benches,
    bench_lru_lookup,
    bench_lru_insert_evict,
    bench_memory_cache_add,
    bench_memory_cache_hit
);
criterion_main!(benches);
