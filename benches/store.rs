use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use serde_json::{json, Value};
use tempfile::TempDir;

use carstore::{slugify, CarStore, StoreConfig};

fn payload(i: usize) -> Value {
    json!({
        "brand": "Hyundai",
        "model": format!("Sonata {i}"),
        "year": 2020,
        "price": 25000 + i,
        "country_code": "KR",
        "color": "black"
    })
}

fn make_store_with_data(records: usize, max_backups: usize) -> (TempDir, CarStore) {
    let dir = TempDir::new().unwrap();
    let store =
        CarStore::open(StoreConfig::new(dir.path()).with_max_backups(max_backups)).unwrap();
    // Seed with backups off so setup cost stays flat.
    let seeder = CarStore::open(StoreConfig::new(dir.path()).with_max_backups(0)).unwrap();
    for i in 0..records {
        seeder.create(payload(i)).unwrap();
    }
    (dir, store)
}

fn bench_read_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/read_all");
    for records in [10usize, 500] {
        let (_dir, store) = make_store_with_data(records, 10);
        group.throughput(Throughput::Elements(records as u64));
        group.bench_function(format!("{records}_records"), |b| {
            b.iter(|| store.read_all().unwrap());
        });
    }
    group.finish();
}

fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/create");
    for max_backups in [0usize, 10] {
        group.bench_function(format!("backups_{max_backups}"), |b| {
            b.iter_batched(
                || make_store_with_data(100, max_backups),
                |(_dir, store)| store.create(payload(100)).unwrap(),
                BatchSize::PerIteration,
            );
        });
    }
    group.finish();
}

fn bench_slugify(c: &mut Criterion) {
    c.bench_function("car/slugify", |b| {
        b.iter(|| slugify("Škoda Octavia RS Combi (2021)"));
    });
}

criterion_group!(store, bench_read_all, bench_create, bench_slugify);
criterion_main!(store);
