//! Generalized Rabenseifner using two all-gather rounds: first all-gather
//! every rank's `A` and `B` (concatenated into one buffer to avoid a second
//! round trip), then every rank computes its own row band (`row_band`) of
//! the result locally, then a second all-gather replicates every band
//! everywhere.
//!
//! Built from the shape the other `grabenseifner_*` siblings share.
//!
//! Works for any process count, not just powers of two.

use dsop_core::{Comm, DsopError, Matrix, ProcessContext, Vector};
use dsop_timing::MpiTimer;

use crate::{row_band, second_phase_allgather, Schedule};

pub struct GrabenseifnerAllgather;

impl Schedule for GrabenseifnerAllgather {
    fn name(&self) -> &'static str {
        "grabenseifner_allgather"
    }

    fn compute(
        &self,
        comm: &dyn Comm,
        ctx: &ProcessContext,
        a_all: &[Vector],
        b_all: &[Vector],
        result: &mut Matrix,
        timer: &mut MpiTimer,
    ) -> Result<(), DsopError> {
        let rank = ctx.rank as usize;
        let p = ctx.num_procs as usize;
        let a = &a_all[rank];
        let b = &b_all[rank];

        timer.time(|| {
            let mut appended = Vec::with_capacity(ctx.n + ctx.m);
            appended.extend_from_slice(a);
            appended.extend_from_slice(b);
            let mut received = vec![0.0; (ctx.n + ctx.m) * p];
            comm.allgather_into(&appended, &mut received);

            let (my_start, my_rows) = row_band(ctx.n, p, rank);
            if my_rows > 0 {
                for origin in 0..p {
                    let base = origin * (ctx.n + ctx.m);
                    let origin_a = &received[base..base + ctx.n];
                    let origin_b = &received[base + ctx.n..base + ctx.n + ctx.m];
                    result.add_submatrix_outer(my_start, 0, &origin_a[my_start..my_start + my_rows], origin_b);
                }
            }

            second_phase_allgather(comm, ctx.n, ctx.m, result);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsop_core::ThreadComm;
    use std::thread;

    fn run_on(num_procs: i32, n: usize, m: usize) {
        let a_all: Vec<Vector> = (0..num_procs).map(|r| (0..n).map(|i| (r * 10 + i as i32) as f64).collect()).collect();
        let b_all: Vec<Vector> = (0..num_procs).map(|r| (0..m).map(|i| (r + i as i32) as f64).collect()).collect();
        let mut expected = Matrix::zeros(n, m);
        dsop_oracle::compute(&a_all, &b_all, &mut expected);

        let comms = ThreadComm::new_group(num_procs);
        let handles: Vec<_> = comms
            .into_iter()
            .enumerate()
            .map(|(rank, comm)| {
                let a_all = a_all.clone();
                let b_all = b_all.clone();
                let expected = expected.clone();
                thread::spawn(move || {
                    let ctx = ProcessContext::new(rank as i32, num_procs, n, m);
                    let mut result = Matrix::zeros(n, m);
                    let mut timer = MpiTimer::new();
                    GrabenseifnerAllgather.compute(&comm, &ctx, &a_all, &b_all, &mut result, &mut timer).unwrap();
                    assert_eq!(result, expected);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn matches_oracle_evenly_divisible() {
        run_on(4, 8, 3);
    }

    #[test]
    fn matches_oracle_non_power_of_two_ranks() {
        run_on(3, 7, 4);
    }

    #[test]
    fn matches_oracle_with_residual_rows() {
        run_on(3, 10, 2);
    }

    #[test]
    fn matches_oracle_fewer_rows_than_ranks() {
        run_on(5, 2, 2);
    }

    #[test]
    fn matches_oracle_single_rank() {
        run_on(1, 3, 3);
    }
}
