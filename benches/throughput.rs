//! Throughput Benchmark for LineKV
//!
//! This benchmark measures the performance of the storage engine
//! under various workloads.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use linekv::protocol::Command;
use linekv::storage::{GlobPattern, StorageEngine};
use std::sync::Arc;
use std::time::Duration;

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let value = Bytes::from("small_value");
            engine.set(format!("key:{}", i), value, None).unwrap();
            i += 1;
        });
    });

    group.bench_function("set_medium", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(1024)); // 1KB value
        b.iter(|| {
            engine.set(format!("key:{}", i), value.clone(), None).unwrap();
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    // Pre-populate with data
    for i in 0..100_000 {
        let value = Bytes::from(format!("value:{}", i));
        engine.set(format!("key:{}", i), value, None).unwrap();
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(engine.get(&key).unwrap());
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(engine.get(&key).unwrap());
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark mixed workload (80% reads, 20% writes)
fn bench_mixed(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    // Pre-populate
    for i in 0..10_000 {
        let value = Bytes::from(format!("value:{}", i));
        engine.set(format!("key:{}", i), value, None).unwrap();
    }

    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(1));

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            if i % 5 == 0 {
                // 20% writes
                engine
                    .set(format!("new:{}", i), Bytes::from("value"), None)
                    .unwrap();
            } else {
                // 80% reads
                let key = format!("key:{}", i % 10_000);
                black_box(engine.get(&key).unwrap());
            }
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark request parsing
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_with_ttl", |b| {
        b.iter(|| black_box(Command::parse(black_box("SET visitor:1234 active EX 3"))));
    });

    group.bench_function("get", |b| {
        b.iter(|| black_box(Command::parse(black_box("GET user:1"))));
    });

    group.finish();
}

/// Benchmark concurrent access
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let engine = Arc::new(StorageEngine::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = format!("key:{}:{}", t, i);
                            engine.set(key.clone(), Bytes::from("value"), None).unwrap();
                            engine.get(&key).unwrap();
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(engine.len());
        });
    });

    group.finish();
}

/// Benchmark expiry operations
fn bench_expiry(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("expiry");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            engine
                .set(
                    format!("key:{}", i),
                    Bytes::from("value"),
                    Some(Duration::from_secs(3600)),
                )
                .unwrap();
            i += 1;
        });
    });

    group.bench_function("expire_existing", |b| {
        // Pre-create keys
        for i in 0..10_000 {
            engine
                .set(format!("expire:{}", i), Bytes::from("value"), None)
                .unwrap();
        }

        let mut i = 0u64;
        b.iter(|| {
            let key = format!("expire:{}", i % 10_000);
            engine.expire(&key, Duration::from_secs(3600)).unwrap();
            i += 1;
        });
    });

    group.bench_function("sweep_10k_expired", |b| {
        b.iter_batched(
            || {
                let engine = StorageEngine::new();
                for i in 0..10_000 {
                    engine
                        .set(
                            format!("gone:{}", i),
                            Bytes::from("value"),
                            Some(Duration::from_millis(1)),
                        )
                        .unwrap();
                }
                std::thread::sleep(Duration::from_millis(2));
                engine
            },
            |engine| {
                while engine.cleanup_expired(256) > 0 {}
                black_box(engine.len());
            },
            BatchSize::PerIteration,
        );
    });

    group.finish();
}

/// Benchmark KEYS pattern matching
fn bench_keys(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    // Pre-populate with various key patterns
    for i in 0..1_000 {
        engine
            .set(format!("user:{}", i), Bytes::from("user_data"), None)
            .unwrap();
        engine
            .set(format!("session:{}", i), Bytes::from("session_data"), None)
            .unwrap();
        engine
            .set(format!("cache:{}", i), Bytes::from("cache_data"), None)
            .unwrap();
    }

    let mut group = c.benchmark_group("keys");

    group.bench_function("keys_pattern", |b| {
        b.iter(|| {
            black_box(engine.keys("user:*").unwrap());
        });
    });

    group.bench_function("keys_all", |b| {
        b.iter(|| {
            black_box(engine.keys("*").unwrap());
        });
    });

    group.bench_function("glob_adversarial", |b| {
        let pattern = GlobPattern::new(&"*a".repeat(16));
        let text = "a".repeat(64) + "b";
        b.iter(|| black_box(pattern.matches(&text)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_mixed,
    bench_parse,
    bench_concurrent,
    bench_expiry,
    bench_keys,
);

criterion_main!(benches);
