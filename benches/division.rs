// Criterion benchmark for `division`, covering the happy path and the
// zero-divisor error path.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use feature_demos::division::division;

fn benchmark_division(c: &mut Criterion) {
    let mut group = c.benchmark_group("division");

    group.bench_function("ok", |b| b.iter(|| division(black_box(3.0), black_box(1.0))));

    group.bench_function("by_zero", |b| {
        b.iter(|| division(black_box(3.0), black_box(0.0)))
    });

    group.finish();
}

criterion_group!(benches, benchmark_division);
criterion_main!(benches);
