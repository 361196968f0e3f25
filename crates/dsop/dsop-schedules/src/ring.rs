//! Ring all-reduce: `result` is split into P contiguous chunks (the last
//! absorbing the NM mod P remainder), then reduce-scattered and
//! all-gathered around the ring in P-1 rounds each, exchanging one chunk
//! per round with the next/previous rank.

use dsop_core::{Comm, DsopError, Matrix, ProcessContext, Vector};
use dsop_timing::MpiTimer;

use crate::tags::ALLREDUCE_RING;
use crate::Schedule;

fn chunk_bounds(matrix_size: usize, num_procs: i32, chunk_index: i32) -> (usize, usize) {
    let chunk_size = matrix_size / num_procs as usize;
    let lo = chunk_index as usize * chunk_size;
    let hi = if chunk_index == num_procs - 1 { matrix_size } else { lo + chunk_size };
    (lo, hi)
}

pub struct AllreduceRing;

impl Schedule for AllreduceRing {
    fn name(&self) -> &'static str {
        "allreduce_ring"
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
        let rank = ctx.rank;
        let num_procs = ctx.num_procs;
        let matrix_size = ctx.n * ctx.m;

        result.set_outer(&a_all[rank as usize], &b_all[rank as usize]);

        if num_procs == 1 {
            return Ok(());
        }

        let dst = (rank + 1) % num_procs;
        let src = (rank - 1).rem_euclid(num_procs);

        timer.time(|| {
            for i in 0..num_procs - 1 {
                let send_chunk = (rank - i).rem_euclid(num_procs);
                let recv_chunk = (rank - i - 1).rem_euclid(num_procs);
                let (send_lo, send_hi) = chunk_bounds(matrix_size, num_procs, send_chunk);
                let (recv_lo, recv_hi) = chunk_bounds(matrix_size, num_procs, recv_chunk);

                let send_buf = result.as_slice()[send_lo..send_hi].to_vec();
                let send_req = comm.isend(dst, ALLREDUCE_RING, send_buf);
                let mut recv_buf = vec![0.0; recv_hi - recv_lo];
                comm.recv_into(src, ALLREDUCE_RING, &mut recv_buf);
                send_req.wait();

                for (dst_cell, v) in result.as_mut_slice()[recv_lo..recv_hi].iter_mut().zip(recv_buf.iter()) {
                    *dst_cell += v;
                }
            }

            for i in 0..num_procs - 1 {
                let send_chunk = (rank - i + 1).rem_euclid(num_procs);
                let recv_chunk = (rank - i).rem_euclid(num_procs);
                let (send_lo, send_hi) = chunk_bounds(matrix_size, num_procs, send_chunk);
                let (recv_lo, recv_hi) = chunk_bounds(matrix_size, num_procs, recv_chunk);

                let send_buf = result.as_slice()[send_lo..send_hi].to_vec();
                let send_req = comm.isend(dst, ALLREDUCE_RING, send_buf);
                let mut recv_buf = vec![0.0; recv_hi - recv_lo];
                comm.recv_into(src, ALLREDUCE_RING, &mut recv_buf);
                send_req.wait();

                result.as_mut_slice()[recv_lo..recv_hi].copy_from_slice(&recv_buf);
            }
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
                    AllreduceRing.compute(&comm, &ctx, &a_all, &b_all, &mut result, &mut timer).unwrap();
                    assert_eq!(result, expected);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn matches_oracle_uneven_chunking() {
        run_on(3, 5, 4);
    }

    #[test]
    fn matches_oracle_single_rank() {
        run_on(1, 3, 2);
    }
}
