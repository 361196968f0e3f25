use std::mem::{align_of, size_of};
use std::path::PathBuf;
use std::time::Instant;

use dsop_core::{Matrix, Vector, generate_vector, seed_for_rank};
use dsop_perf::*;

const SIZES: &[(usize, usize)] = &[(16, 16), (128, 128), (1024, 256), (4096, 4096)];
const NUM_PROCS_FOR_RABENSEIFNER_DEMO: i32 = 8;

fn main() {
    let mut results: Vec<BenchResult> = Vec::new();

    // ═══════════════════════════════════════════════════════════════════════
    // 1. Banner
    // ═══════════════════════════════════════════════════════════════════════
    print_banner();

    // ═══════════════════════════════════════════════════════════════════════
    // 2. Memory Layout
    // ═══════════════════════════════════════════════════════════════════════
    section_memory_layout();

    // ═══════════════════════════════════════════════════════════════════════
    // 3. Clock Calibration
    // ═══════════════════════════════════════════════════════════════════════
    section_clock(&mut results);

    // ═══════════════════════════════════════════════════════════════════════
    // 4. Matrix Hot Path (outer product / accumulate)
    // ═══════════════════════════════════════════════════════════════════════
    section_matrix_hot_path(&mut results);

    // ═══════════════════════════════════════════════════════════════════════
    // 5. Rabenseifner-Style Local Reassembly
    // ═══════════════════════════════════════════════════════════════════════
    section_reassembly(&mut results);

    // ═══════════════════════════════════════════════════════════════════════
    // 6. Criterion Hot Path Results (read from criterion JSON, if present)
    // ═══════════════════════════════════════════════════════════════════════
    let criterion_dir = criterion_target_dir();
    section_criterion_paths(&criterion_dir);

    // ═══════════════════════════════════════════════════════════════════════
    // 7. JSON Output
    // ═══════════════════════════════════════════════════════════════════════
    save_results(&results);
}

fn print_banner() {
    println!("╔{}╗", "═".repeat(88));
    println!(
        "║ {:<86} ║",
        "dsop performance report — local compute hot paths (no communicator involved)"
    );
    println!("╚{}╝", "═".repeat(88));
}

fn section_memory_layout() {
    section_header("Memory Layout");
    println!("  Matrix:    size={:>4} B  align={:>2} B", size_of::<Matrix>(), align_of::<Matrix>());
    println!("  Vector elem (f64): size={:>4} B  align={:>2} B", size_of::<f64>(), align_of::<f64>());
}

fn section_clock(results: &mut Vec<BenchResult>) {
    section_header("Clock Calibration");
    print_table_header();

    let r = measure_batched("dsop_timing::now_us", 200, 1000, 20, || {
        std::hint::black_box(dsop_timing::now_us());
    });
    print_result_row(&r);
    results.push(r);

    let r = measure_batched("std::time::Instant::now", 200, 1000, 20, || {
        std::hint::black_box(Instant::now());
    });
    print_result_row(&r);
    results.push(r);
}

fn section_matrix_hot_path(results: &mut Vec<BenchResult>) {
    section_header("Matrix Outer Product Hot Path");
    print_table_header();

    for &(n, m) in SIZES {
        let a: Vector = generate_vector(seed_for_rank(1, 0), n, -1.0, 1.0);
        let b: Vector = generate_vector(seed_for_rank(2, 0), m, -1.0, 1.0);
        let mut mat = Matrix::zeros(n, m);

        let r = measure_batched(&format!("Matrix::set_outer {n}x{m}"), 50, 20, 5, || {
            mat.set_outer(&a, &b);
            std::hint::black_box(&mat);
        });
        print_result_row(&r);
        results.push(r);

        let r = measure_batched(&format!("Matrix::add_outer {n}x{m}"), 50, 20, 5, || {
            mat.add_outer(&a, &b);
            std::hint::black_box(&mat);
        });
        print_result_row(&r);
        results.push(r);
    }
}

fn section_reassembly(results: &mut Vec<BenchResult>) {
    section_header("P-Fold Local Reassembly (Rabenseifner / Bruck style)");
    print_table_header();

    for &(n, m) in &SIZES[..3] {
        let (a_all, b_all) = generate_corpus(NUM_PROCS_FOR_RABENSEIFNER_DEMO, n, m);

        let r = measure_batched(
            &format!("P-fold accumulate P={NUM_PROCS_FOR_RABENSEIFNER_DEMO} {n}x{m}"),
            20,
            5,
            2,
            || {
                let mut acc = Matrix::zeros(n, m);
                for r in 0..a_all.len() {
                    acc.add_outer(&a_all[r], &b_all[r]);
                }
                std::hint::black_box(&acc);
            },
        );
        print_result_row(&r);
        results.push(r);
    }
}

fn criterion_target_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(|p| p.join("target/criterion"))
        .unwrap_or_else(|| PathBuf::from("target/criterion"))
}

fn section_criterion_paths(dir: &PathBuf) {
    section_header("Criterion Reports");
    if dir.exists() {
        println!("  HTML reports available under: {}", dir.display());
    } else {
        println!("  (none found — run `cargo bench -p dsop-perf` first)");
    }
}

fn save_results(results: &[BenchResult]) {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("perf_report.json");
    match serde_json::to_string_pretty(results) {
        Ok(json) => {
            if let Err(err) = std::fs::write(&path, json) {
                eprintln!("warning: failed to write {}: {err}", path.display());
            } else {
                println!("\nResults written to {}", path.display());
            }
        }
        Err(err) => eprintln!("warning: failed to serialize results: {err}"),
    }
}
