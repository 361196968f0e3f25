//! Criterion benchmarks for the matrix hot path and the local-compute
//! portions of the schedule library (no communicator involved — schedules
//! are benchmarked only for the outer-product/accumulate work they do
//! between sends/recvs, using `ThreadComm` where a schedule needs one at
//! all). `dsop_perf_report` reads the resulting criterion JSON for its
//! display.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use dsop_core::{Matrix, Vector, generate_vector, seed_for_rank};
use dsop_perf::generate_corpus;

const SIZES: &[(usize, usize)] = &[(16, 16), (128, 128), (1024, 256)];
const NUM_PROCS: i32 = 8;

// ─── Matrix group ───────────────────────────────────────────────────────────

fn bench_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("matrix");

    for &(n, m) in SIZES {
        let a: Vector = generate_vector(seed_for_rank(1, 0), n, -1.0, 1.0);
        let b: Vector = generate_vector(seed_for_rank(2, 0), m, -1.0, 1.0);

        group.bench_function(format!("set_outer_{n}x{m}"), |bch| {
            let mut mat = Matrix::zeros(n, m);
            bch.iter(|| {
                mat.set_outer(black_box(&a), black_box(&b));
            });
        });

        group.bench_function(format!("add_outer_{n}x{m}"), |bch| {
            let mut mat = Matrix::zeros(n, m);
            bch.iter(|| {
                mat.add_outer(black_box(&a), black_box(&b));
            });
        });

        group.bench_function(format!("add_in_place_{n}x{m}"), |bch| {
            let src = {
                let mut m0 = Matrix::zeros(n, m);
                m0.set_outer(&a, &b);
                m0
            };
            let mut dst = Matrix::zeros(n, m);
            bch.iter(|| {
                dst.add_in_place(black_box(&src));
            });
        });
    }

    group.finish();
}

// ─── Oracle / reassembly group ──────────────────────────────────────────────

fn bench_oracle(c: &mut Criterion) {
    let mut group = c.benchmark_group("oracle");

    for &(n, m) in &SIZES[..2] {
        let (a_all, b_all) = generate_corpus(NUM_PROCS, n, m);

        group.bench_function(format!("sequential_compute_P{NUM_PROCS}_{n}x{m}"), |bch| {
            bch.iter(|| {
                let mut result = Matrix::zeros(n, m);
                dsop_oracle::compute(black_box(&a_all), black_box(&b_all), &mut result);
                black_box(&result);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_matrix, bench_oracle);
criterion_main!(benches);
