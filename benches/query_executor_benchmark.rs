use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use qminer_core::core::config::{Config, OpenMode};
use qminer_core::schema::field::FieldType;
use qminer_core::vocab::word_voc::SortType;
use qminer_core::Base;
use serde_json::json;

/// A fresh `people` store with `doc_count` records: a text `name` key
/// drawn from a small vocabulary (so term queries hit many postings)
/// and a numeric `age` key for range queries.
fn seeded_base(dir: &std::path::Path, doc_count: usize) -> Base {
    let mut config = Config::default();
    config.storage_path = dir.to_path_buf();
    config.open_mode = OpenMode::Create;
    let mut base = Base::open(config).unwrap();

    let people = base.create_store("people").unwrap();
    let name_f = base.add_field(people, "name", FieldType::String).unwrap();
    let bio_f = base.add_field(people, "bio", FieldType::String).unwrap();
    let age_f = base.add_field(people, "age", FieldType::Int).unwrap();
    base.add_value_key(people, "name", name_f, SortType::ByStr).unwrap();
    base.add_text_key(people, "bio", bio_f, "standard").unwrap();
    base.add_value_key(people, "age", age_f, SortType::ByFlt).unwrap();

    let names = ["Ada", "Bob", "Cid", "Dee", "Eve"];
    for i in 0..doc_count {
        base.add_rec(
            people,
            &json!({
                "name": names[i % names.len()],
                "bio": "rust programming search engine over a typed analytics store",
                "age": (i % 90) as i64,
            }),
        )
        .unwrap();
    }

    base
}

fn bench_value_key_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_value_key");

    for &size in &[100usize, 1_000, 10_000] {
        let dir = tempfile::tempdir().unwrap();
        let mut base = seeded_base(dir.path(), size);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |bencher, _| {
            bencher.iter(|| {
                let result = base.search(black_box(&json!({"$from": "people", "name": "Ada"}))).unwrap();
                black_box(result);
            });
        });
    }

    group.finish();
}

fn bench_range_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_range_query");

    for &size in &[100usize, 1_000, 10_000] {
        let dir = tempfile::tempdir().unwrap();
        let mut base = seeded_base(dir.path(), size);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |bencher, _| {
            bencher.iter(|| {
                let result = base
                    .search(black_box(&json!({"$from": "people", "age": {"$gt": "40", "$lt": "60"}})))
                    .unwrap();
                black_box(result);
            });
        });
    }

    group.finish();
}

fn bench_negated_and(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut base = seeded_base(dir.path(), 5_000);

    let mut group = c.benchmark_group("search_negation_pushdown");
    group.bench_function("not_and", |bencher| {
        bencher.iter(|| {
            let result = base
                .search(black_box(&json!({
                    "$from": "people",
                    "$and": [
                        {"bio": "rust"},
                        {"$not": {"name": "Ada"}},
                    ],
                })))
                .unwrap();
            black_box(result);
        });
    });
    group.bench_function("or_of_values", |bencher| {
        bencher.iter(|| {
            let result = base
                .search(black_box(&json!({
                    "$from": "people",
                    "$or": [
                        {"name": "Ada"},
                        {"name": "Bob"},
                    ],
                })))
                .unwrap();
            black_box(result);
        });
    });
    group.finish();
}

fn bench_text_key_lookup(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut base = seeded_base(dir.path(), 5_000);

    c.bench_function("search_text_key_term", |bencher| {
        bencher.iter(|| {
            let result = base.search(black_box(&json!({"$from": "people", "bio": "engine"}))).unwrap();
            black_box(result);
        });
    });
}

criterion_group!(
    benches,
    bench_value_key_lookup,
    bench_range_query,
    bench_negated_and,
    bench_text_key_lookup
);
criterion_main!(benches);
