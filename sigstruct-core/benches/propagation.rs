//! Propagation Benchmarks
//!
//! Measures how fast writes travel through chains and fan-outs of
//! derivations, and how much batching saves over individual writes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sigstruct_core::{Computed, Memo, Props, Runtime, Shape, Value};

fn chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");

    for depth in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let rt = Runtime::new();
            let source = rt.cell(0i64);

            let first = {
                let s = source.clone();
                rt.derive(move || s.get() + 1)
            };
            let mut tail: Memo<i64> = first;
            for _ in 1..depth {
                let prev = tail.clone();
                tail = rt.derive(move || prev.get().unwrap_or(0) + 1);
            }

            let mut n = 0i64;
            b.iter(|| {
                n += 1;
                source.set(n);
                black_box(tail.get())
            });
        });
    }

    group.finish();
}

fn fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for width in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            let rt = Runtime::new();
            let source = rt.cell(0i64);

            let effects: Vec<_> = (0..width)
                .map(|i| {
                    let s = source.clone();
                    rt.react(move || {
                        black_box(s.get() + i as i64);
                    })
                })
                .collect();

            let mut n = 0i64;
            b.iter(|| {
                n += 1;
                source.set(n);
            });

            sigstruct_core::dispose(&effects);
        });
    }

    group.finish();
}

fn batching(c: &mut Criterion) {
    let mut group = c.benchmark_group("batching");
    let writes = 100;

    let rt = Runtime::new();
    let cells: Vec<_> = (0..writes).map(|_| rt.cell(0i64)).collect();
    let watched = cells.clone();
    let _sum = rt.react(move || {
        black_box(watched.iter().map(|c| c.get()).sum::<i64>());
    });

    let mut n = 0i64;
    group.bench_function("unbatched", |b| {
        b.iter(|| {
            n += 1;
            for cell in &cells {
                cell.set(n);
            }
        })
    });
    group.bench_function("batched", |b| {
        b.iter(|| {
            n += 1;
            rt.batch(|| {
                for cell in &cells {
                    cell.set(n);
                }
            })
        })
    });

    group.finish();
}

fn structure(c: &mut Criterion) {
    let shape = Shape::builder("Item")
        .value("price", 10)
        .value("qty", 1)
        .computed(
            "total",
            Computed::new(|s| {
                let price = s.get("price")?.as_i64().unwrap_or(0);
                let qty = s.get("qty")?.as_i64().unwrap_or(0);
                Ok(Value::from(price * qty))
            }),
        )
        .build();
    let rt = Runtime::new();

    c.bench_function("structure/build", |b| {
        b.iter(|| black_box(rt.structure(&shape, Props::new().with("qty", 3))))
    });
}

criterion_group!(benches, chain, fan_out, batching, structure);
criterion_main!(benches);
