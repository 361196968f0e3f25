//! `grabenseifner_allgather`, but the first round for `A` is split into an
//! all-gather (for `B`) plus `num_procs` scatters (for `A`): rank `i`
//! scatters its own `A` vector so every other rank only ever receives the
//! row-chunk it actually needs, rather than the whole vector. The last
//! rank absorbs whatever rows don't divide evenly via a small separate
//! gather.
//!
//! Falls back to a plain two-vector all-gather when there are fewer rows
//! than ranks, since a zero-sized scatter chunk is degenerate.
//!
//! Works for any process count, not just powers of two.

use dsop_core::{Comm, DsopError, Matrix, ProcessContext, Vector};
use dsop_timing::MpiTimer;

use crate::{row_band, second_phase_allgather, Schedule};

pub struct GrabenseifnerAllgatherScatter;

impl Schedule for GrabenseifnerAllgatherScatter {
    fn name(&self) -> &'static str {
        "grabenseifner_allgather_scatter"
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
            let mut gathered_b = vec![0.0; ctx.m * p];
            comm.allgather_into(b, &mut gathered_b);

            if ctx.n < p {
                let mut gathered_a = vec![0.0; ctx.n * p];
                comm.allgather_into(a, &mut gathered_a);
                let (my_start, my_rows) = row_band(ctx.n, p, rank);
                if my_rows > 0 {
                    for origin in 0..p {
                        let origin_a = &gathered_a[origin * ctx.n..(origin + 1) * ctx.n];
                        let origin_b = &gathered_b[origin * ctx.m..(origin + 1) * ctx.m];
                        result.add_submatrix_outer(my_start, 0, &origin_a[my_start..my_start + my_rows], origin_b);
                    }
                }
                second_phase_allgather(comm, ctx.n, ctx.m, result);
                return;
            }

            let my_n_rows = ctx.n / p;
            let last_n_rows = ctx.n - (p - 1) * my_n_rows;
            let residual_rows = last_n_rows - my_n_rows;
            let my_start_row = my_n_rows * rank;

            let mut recv_a = vec![0.0; my_n_rows * p];
            let my_scatter_send = &a[..p * my_n_rows];
            for origin in 0..p {
                let chunk = &mut recv_a[origin * my_n_rows..(origin + 1) * my_n_rows];
                let send_buf: &[f64] = if origin == rank { my_scatter_send } else { &[] };
                comm.scatter_from_root_into(origin as i32, send_buf, chunk);
            }

            for proc_i in 0..p {
                let a_base = proc_i * my_n_rows;
                let b_base = proc_i * ctx.m;
                for row_i in 0..my_n_rows {
                    for col_i in 0..ctx.m {
                        *result.get_mut(my_start_row + row_i, col_i) += recv_a[a_base + row_i] * gathered_b[b_base + col_i];
                    }
                }
            }

            if residual_rows != 0 {
                let mut residual_buf = vec![0.0; residual_rows * p];
                comm.gather_to_root_into(p as i32 - 1, &a[p * my_n_rows..ctx.n], &mut residual_buf);
                if rank == p - 1 {
                    let start_row = p * my_n_rows;
                    for proc_i in 0..p {
                        let a_base = proc_i * residual_rows;
                        let b_base = proc_i * ctx.m;
                        for row_i in 0..residual_rows {
                            for col_i in 0..ctx.m {
                                *result.get_mut(start_row + row_i, col_i) +=
                                    residual_buf[a_base + row_i] * gathered_b[b_base + col_i];
                            }
                        }
                    }
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
                    GrabenseifnerAllgatherScatter.compute(&comm, &ctx, &a_all, &b_all, &mut result, &mut timer).unwrap();
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
