//! Per-iteration flow: barrier, zero the result buffer, run the selected
//! schedule, gather timings and (optionally) results to root, validate
//! against the oracle, emit one JSON record per iteration.

use dsop_core::{Comm, DsopError, Matrix, ProcessContext, Vector, generate_vector, seed_for_rank};
use dsop_schedules::default_registry;
use dsop_timing::{MpiTimer, ScopedTimer};

use crate::report::{IterationRecord, emit, epoch_us};

const INPUT_LOW: f64 = -1.0;
const INPUT_HIGH: f64 = 1.0;
const VALIDATION_TOLERANCE: f64 = 1e-5;

/// Base seed every rank's `(A, B)` pair is derived from via
/// `seed_for_rank` — the seed is a process-wide constant so validation can
/// regenerate every rank's inputs from nothing but `num_procs` (see
/// `reference_inputs` below), without any rank shipping its raw vectors
/// anywhere.
const BASE_SEED_A: u64 = 0x5EED_0000;
const BASE_SEED_B: u64 = 0x5EED_0001;

pub struct RunConfig {
    pub n: usize,
    pub m: usize,
    pub schedule_name: String,
    pub iterations: u32,
    pub validate: bool,
    pub verbose: bool,
}

/// This rank's own `(A, B)` pair, deterministic given `(n, m, rank)`.
fn rank_inputs(rank: i32, n: usize, m: usize) -> (Vector, Vector) {
    let a = generate_vector(seed_for_rank(BASE_SEED_A, rank), n, INPUT_LOW, INPUT_HIGH);
    let b = generate_vector(seed_for_rank(BASE_SEED_B, rank), m, INPUT_LOW, INPUT_HIGH);
    (a, b)
}

/// Every rank's `(A, B)` pair, used only by root to build the oracle's
/// input without any rank having to ship its raw vectors over the wire —
/// the seeded generator is the source of truth, not a message.
fn reference_inputs(num_procs: i32, n: usize, m: usize) -> (Vec<Vector>, Vec<Vector>) {
    (0..num_procs).map(|r| rank_inputs(r, n, m)).unzip()
}

/// Frobenius^2 distance between two equal-length flat buffers; NaN
/// propagates to +infinity, matching `Matrix::frobenius_sq_diff`.
fn frobenius_sq(a: &[f64], b: &[f64]) -> f64 {
    let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    if sum.is_nan() { f64::INFINITY } else { sum }
}

/// Runs `config.iterations` iterations of the named schedule over `comm`,
/// emitting one JSON record per iteration on the root rank. Returns the
/// first error encountered (usage, unsupported configuration, or
/// validation failure) — there is no retry and no partial-result path.
pub fn run(comm: &dyn Comm, config: &RunConfig) -> Result<(), DsopError> {
    if config.n == 0 || config.m == 0 {
        return Err(DsopError::Usage("N and M must both be > 0".to_string()));
    }

    let schedule = default_registry(&config.schedule_name)
        .ok_or_else(|| DsopError::Usage(format!("unknown schedule '{}'", config.schedule_name)))?;

    let num_procs = comm.size();
    let rank = comm.rank();
    let ctx = ProcessContext::new(rank, num_procs, config.n, config.m);

    let (my_a, my_b) = rank_inputs(rank, config.n, config.m);
    let mut a_all: Vec<Vector> = (0..num_procs as usize).map(|_| vec![0.0; config.n]).collect();
    let mut b_all: Vec<Vector> = (0..num_procs as usize).map(|_| vec![0.0; config.m]).collect();
    a_all[rank as usize] = my_a;
    b_all[rank as usize] = my_b;

    if config.verbose {
        println!("A_{rank} = {:?}", a_all[rank as usize]);
        println!("B_{rank} = {:?}", b_all[rank as usize]);
    }

    for iteration in 0..config.iterations {
        comm.barrier();

        let mut result = Matrix::zeros(config.n, config.m);
        let mut timer = MpiTimer::new();
        let wall_timer = ScopedTimer::start();
        schedule.compute(comm, &ctx, &a_all, &b_all, &mut result, &mut timer)?;
        let wall_us = wall_timer.finish();
        let mpi_us = timer.total_us();
        debug_assert!(mpi_us <= wall_us, "mpi_time must never exceed the total wall time it's charged against");

        if config.verbose && ctx.is_root() {
            println!("result (iteration {iteration}):");
            for i in 0..config.n {
                let row: Vec<f64> = (0..config.m).map(|j| result.get(i, j)).collect();
                println!("  {row:?}");
            }
        }

        let mut wall_gathered = vec![0.0; num_procs as usize];
        comm.gather_to_root_into(0, &[wall_us as f64], &mut wall_gathered);
        let mut mpi_gathered = vec![0.0; num_procs as usize];
        comm.gather_to_root_into(0, &[mpi_us as f64], &mut mpi_gathered);

        let errors = if config.validate {
            let mut result_gathered = vec![0.0; config.n * config.m * num_procs as usize];
            comm.gather_to_root_into(0, result.as_slice(), &mut result_gathered);

            if ctx.is_root() {
                let (ref_a, ref_b) = reference_inputs(num_procs, config.n, config.m);
                let mut oracle_result = Matrix::zeros(config.n, config.m);
                dsop_oracle::compute(&ref_a, &ref_b, &mut oracle_result);

                let chunk = config.n * config.m;
                let mut per_rank = Vec::with_capacity(num_procs as usize);
                for r in 0..num_procs as usize {
                    let frob = frobenius_sq(&result_gathered[r * chunk..(r + 1) * chunk], oracle_result.as_slice());
                    if frob > VALIDATION_TOLERANCE {
                        return Err(DsopError::Validation { rank: r as i32, frobenius_sq: frob });
                    }
                    per_rank.push(frob);
                }
                Some(per_rank)
            } else {
                None
            }
        } else {
            None
        };

        if ctx.is_root() {
            let (slowest, _) =
                wall_gathered.iter().enumerate().max_by(|a, b| a.1.total_cmp(b.1)).expect("num_procs >= 1");
            let runtimes: Vec<i64> = wall_gathered.iter().map(|&x| x.round() as i64).collect();
            let runtimes_mpi: Vec<i64> = mpi_gathered.iter().map(|&x| x.round() as i64).collect();
            let runtimes_compute: Vec<i64> =
                runtimes.iter().zip(&runtimes_mpi).map(|(wall, mpi)| wall - mpi).collect();

            let record = IterationRecord {
                timestamp: epoch_us(),
                name: schedule.name().to_string(),
                n: config.n,
                m: config.m,
                numprocs: num_procs,
                num_iterations: config.iterations,
                iteration,
                runtime: runtimes[slowest],
                runtime_mpi: runtimes_mpi[slowest],
                runtime_compute: runtimes_compute[slowest],
                runtimes,
                runtimes_mpi,
                runtimes_compute,
                errors,
            };
            emit(&record);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsop_core::ThreadComm;
    use std::thread;

    fn run_group(num_procs: i32, config: RunConfig) -> Result<(), DsopError> {
        let comms = ThreadComm::new_group(num_procs);
        let config = std::sync::Arc::new(config);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let config = std::sync::Arc::clone(&config);
                thread::spawn(move || run(&comm, &config))
            })
            .collect();
        let mut last = Ok(());
        for h in handles {
            last = h.join().unwrap();
        }
        last
    }

    #[test]
    fn validated_run_succeeds_for_every_registered_schedule() {
        for &name in dsop_schedules::registry_names() {
            let config =
                RunConfig { n: 5, m: 4, schedule_name: name.to_string(), iterations: 2, validate: true, verbose: false };
            run_group(4, config).unwrap_or_else(|e| panic!("schedule '{name}' failed validation: {e}"));
        }
    }

    #[test]
    fn unknown_schedule_name_is_a_usage_error() {
        let config = RunConfig { n: 2, m: 2, schedule_name: "not-a-schedule".into(), iterations: 1, validate: false, verbose: false };
        let err = run_group(2, config).unwrap_err();
        assert!(matches!(err, DsopError::Usage(_)));
    }

    #[test]
    fn zero_sized_vector_is_a_usage_error() {
        let config = RunConfig { n: 0, m: 2, schedule_name: "allreduce".into(), iterations: 1, validate: false, verbose: false };
        let err = run_group(1, config).unwrap_err();
        assert!(matches!(err, DsopError::Usage(_)));
    }

    #[test]
    fn non_power_of_two_rabenseifner_is_unsupported() {
        let config = RunConfig {
            n: 4,
            m: 4,
            schedule_name: "allreduce_rabenseifner".into(),
            iterations: 1,
            validate: false,
            verbose: false,
        };
        let err = run_group(6, config).unwrap_err();
        assert!(matches!(err, DsopError::UnsupportedConfiguration(_)));
    }
}
