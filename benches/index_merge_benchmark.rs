use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use qminer_core::core::types::RecId;
use qminer_core::index::merger::Merger;
use qminer_core::index::posting::{PostingItem, PostingList};

/// Two sorted posting lists of `size` items with `overlap` fraction of
/// shared rec ids, mimicking two postings pulled for an And/Or node.
fn make_pair(size: usize, overlap: f64) -> (PostingList, PostingList) {
    let shared = (size as f64 * overlap) as u64;
    let a: Vec<PostingItem> = (0..size as u64).map(|i| PostingItem::new(RecId(i), 1)).collect();
    let b: Vec<PostingItem> = (0..shared)
        .chain((size as u64)..(size as u64 + (size as u64 - shared)))
        .map(|i| PostingItem::new(RecId(i), 1))
        .collect();
    (PostingList::from_sorted(a), PostingList::from_sorted(b))
}

fn bench_union_intersect_minus(c: &mut Criterion) {
    let mut group = c.benchmark_group("posting_algebra");

    for &size in &[100usize, 1_000, 10_000, 100_000] {
        let (a, b) = make_pair(size, 0.5);

        group.bench_with_input(BenchmarkId::new("union", size), &(a.clone(), b.clone()), |bencher, (a, b)| {
            bencher.iter(|| black_box(Merger::union(black_box(a), black_box(b))));
        });

        group.bench_with_input(BenchmarkId::new("intersect", size), &(a.clone(), b.clone()), |bencher, (a, b)| {
            bencher.iter(|| black_box(Merger::intersect(black_box(a), black_box(b))));
        });

        group.bench_with_input(BenchmarkId::new("minus", size), &(a, b), |bencher, (a, b)| {
            bencher.iter(|| black_box(Merger::minus(black_box(a), black_box(b))));
        });
    }

    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("posting_normalize");

    for &size in &[1_000usize, 10_000, 100_000] {
        // unsorted with ~10% duplicate rec ids (simulating repeated adds
        // folded together before a flush), forcing the sort path.
        let mut items: Vec<PostingItem> = (0..size as u64)
            .map(|i| PostingItem::new(RecId(i / 2), 1))
            .collect();
        items.reverse();

        group.bench_with_input(BenchmarkId::from_parameter(size), &items, |bencher, items| {
            bencher.iter(|| black_box(Merger::normalize(black_box(items.clone()))));
        });
    }

    group.finish();
}

fn bench_unique_variants(c: &mut Criterion) {
    let (a, b) = make_pair(10_000, 0.5);

    let mut group = c.benchmark_group("posting_algebra_unique");
    group.bench_function("union_unique", |bencher| {
        bencher.iter(|| black_box(Merger::union_unique(black_box(&a), black_box(&b))));
    });
    group.bench_function("intersect_unique", |bencher| {
        bencher.iter(|| black_box(Merger::intersect_unique(black_box(&a), black_box(&b))));
    });
    group.bench_function("minus_unique", |bencher| {
        bencher.iter(|| black_box(Merger::minus_unique(black_box(&a), black_box(&b))));
    });
    group.finish();
}

criterion_group!(benches, bench_union_intersect_minus, bench_normalize, bench_unique_variants);
criterion_main!(benches);
