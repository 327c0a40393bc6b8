//! Lazy deep clone benchmarks
//!
//! Compares the cost of cloning a graph against the cost of touching it.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lazyclone::{members, Lazy, Memo, Mutable, Object, Shared};

#[derive(Clone)]
struct Node {
    value: Mutable<u64>,
    next: Lazy<Shared<Node>>,
}

members!(Node { value, next });

impl Object for Node {}

fn build_list(len: usize) -> Lazy<Shared<Node>> {
    (0..len as u64).rev().fold(Lazy::nil(), |next, value| {
        Lazy::new(Node {
            value: Mutable::new(value),
            next,
        })
    })
}

fn write_all(list: &Lazy<Shared<Node>>) {
    let mut cursor = list.get();
    while let Some(node) = cursor {
        *node.value.write() += 1;
        cursor = node.next.get();
    }
}

fn bench_deep_clone(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep_clone");

    for size in [16usize, 256, 4096].iter() {
        let list = build_list(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(list.deep_clone()));
        });
    }

    group.finish();
}

fn bench_clone_then_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("clone_then_write");

    for size in [16usize, 256].iter() {
        let list = build_list(*size);
        group.bench_with_input(BenchmarkId::new("head", size), size, |b, _| {
            b.iter(|| {
                let clone = list.deep_clone();
                if let Some(head) = clone.get() {
                    head.value.set(0);
                }
                black_box(clone)
            });
        });
        group.bench_with_input(BenchmarkId::new("all", size), size, |b, _| {
            b.iter(|| {
                let clone = list.deep_clone();
                write_all(&clone);
                black_box(clone)
            });
        });
    }

    group.finish();
}

fn bench_memo(c: &mut Criterion) {
    let mut group = c.benchmark_group("memo");
    let objects: Vec<Shared<Node>> = (0..1024)
        .map(|i| {
            Shared::new(Node {
                value: Mutable::new(i),
                next: Lazy::nil(),
            })
        })
        .collect();

    group.bench_function("put_1024", |b| {
        b.iter(|| {
            let memo = Memo::with_capacity(0);
            for pair in objects.windows(2) {
                memo.put(pair[0].as_ptr(), pair[1].as_ptr());
            }
            black_box(memo)
        });
    });

    let memo = Memo::with_capacity(2048);
    for pair in objects.windows(2) {
        memo.put(pair[0].as_ptr(), pair[1].as_ptr());
    }
    group.bench_function("get_hit", |b| {
        b.iter(|| {
            for object in &objects {
                black_box(memo.get(object.as_ptr()));
            }
        });
    });

    group.finish();
}

fn bench_handles(c: &mut Criterion) {
    let mut group = c.benchmark_group("handles");
    let object = Shared::new(Node {
        value: Mutable::new(0),
        next: Lazy::nil(),
    });

    group.bench_function("shared_clone_drop", |b| {
        b.iter(|| black_box(object.clone()));
    });
    group.bench_function("create_drop", |b| {
        b.iter(|| {
            black_box(Shared::new(Node {
                value: Mutable::new(1),
                next: Lazy::nil(),
            }))
        });
    });

    group.finish();
    lazyclone::gc::clear_candidates();
}

criterion_group!(
    benches,
    bench_deep_clone,
    bench_clone_then_write,
    bench_memo,
    bench_handles
);
criterion_main!(benches);
