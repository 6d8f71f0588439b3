use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use remote_cfg::cfg::{MemoryStore, RemoteConfigProvider, RemoteSourceOptions};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

// ========== 辅助函数 ==========

fn generate_values(n: usize, version: usize) -> HashMap<String, String> {
    let mut values: HashMap<String, String> = (0..n)
        .map(|i| (format!("key_{:06}", i), format!("value_{:06}", i)))
        .collect();
    values.insert("Version".to_string(), version.to_string());
    values
}

fn loaded_provider(n: usize) -> (Arc<MemoryStore>, Arc<RemoteConfigProvider>) {
    let store = Arc::new(MemoryStore::new());
    store.replace_all(generate_values(n, 0));
    let provider =
        RemoteConfigProvider::new(store.clone(), RemoteSourceOptions::default()).unwrap();
    provider.load().unwrap();
    (store, Arc::new(provider))
}

// ========== 1. 单线程读取 ==========

fn benchmark_get_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_value");

    for size in [10, 1_000, 100_000] {
        let (_store, provider) = loaded_provider(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % size;
                black_box(provider.get_value(&format!("key_{:06}", i)));
            });
        });
    }

    group.finish();
}

// ========== 2. 刷新期间读取 ==========

fn benchmark_get_value_during_reload(c: &mut Criterion) {
    let (store, provider) = loaded_provider(1_000);
    let done = Arc::new(AtomicBool::new(false));

    let reloader = {
        let provider = provider.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut version = 0;
            while !done.load(Ordering::Relaxed) {
                version += 1;
                store.replace_all(generate_values(1_000, version));
                let _ = provider.check_for_changes();
            }
        })
    };

    c.bench_function("get_value_during_reload", |b| {
        b.iter(|| black_box(provider.get_value("key_000500")));
    });

    done.store(true, Ordering::Relaxed);
    let _ = reloader.join();
}

// ========== 3. 版本检查 ==========

fn benchmark_check_unchanged(c: &mut Criterion) {
    let (_store, provider) = loaded_provider(1_000);

    c.bench_function("check_for_changes_unchanged", |b| {
        b.iter(|| black_box(provider.check_for_changes().unwrap()));
    });
}

criterion_group!(
    benches,
    benchmark_get_value,
    benchmark_get_value_during_reload,
    benchmark_check_unchanged
);
criterion_main!(benches);
