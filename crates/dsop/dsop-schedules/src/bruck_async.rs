//! Classical Bruck all-gather, doubling the populated prefix of a shared
//! receive buffer each round, with the reduction of previously-landed
//! chunks overlapped against the in-flight round's exchange. Tolerates
//! non-power-of-two process counts: the last round simply sends/receives
//! fewer chunks than the `2^i` progression would suggest.

use dsop_core::{Comm, DsopError, Matrix, ProcessContext, Vector};
use dsop_timing::MpiTimer;

use crate::tags::BRUCK_ASYNC;
use crate::{n_rounds, Schedule};

pub struct BruckAsync;

impl Schedule for BruckAsync {
    fn name(&self) -> &'static str {
        "bruck_async"
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
        let n = ctx.n;
        let m = ctx.m;
        let vec_size = n + m;
        let rank = ctx.rank;
        let num_procs = ctx.num_procs;

        let mut rbuf = vec![0.0; vec_size * num_procs as usize];
        rbuf[..n].copy_from_slice(&a_all[rank as usize]);
        rbuf[n..vec_size].copy_from_slice(&b_all[rank as usize]);

        let rounds = if num_procs.count_ones() == 1 { n_rounds(num_procs) } else { n_rounds(num_procs) + 1 };

        let mut chunks_received: i32 = 1;
        let mut to_compute_start: i32 = 0;
        let mut to_compute_end: i32 = 1;

        timer.time(|| {
            for i in 0..rounds {
                let offset = 1i32 << i;
                let target = (rank - offset).rem_euclid(num_procs);
                let source = (rank + offset) % num_procs;

                let chunks_remaining = num_procs - chunks_received;
                let num_chunks_send = offset.min(chunks_remaining);
                let num_send = (vec_size as i32 * num_chunks_send) as usize;

                let send_slice = rbuf[..num_send].to_vec();
                let recv_start = (chunks_received as usize) * vec_size;

                let send_req = comm.isend(target, BRUCK_ASYNC, send_slice);
                let recv_req = comm.irecv(source, BRUCK_ASYNC, num_send);

                for z in to_compute_start..to_compute_end {
                    let off = z as usize * vec_size;
                    let chunk_a = &rbuf[off..off + n];
                    let chunk_b = &rbuf[off + n..off + vec_size];
                    result.add_outer(chunk_a, chunk_b);
                }

                to_compute_start = to_compute_end;
                to_compute_end += num_chunks_send;
                chunks_received += num_chunks_send;

                send_req.wait();
                let received = recv_req.wait();
                rbuf[recv_start..recv_start + num_send].copy_from_slice(&received);
            }

            for z in to_compute_start..to_compute_end {
                let off = z as usize * vec_size;
                let chunk_a = &rbuf[off..off + n];
                let chunk_b = &rbuf[off + n..off + vec_size];
                result.add_outer(chunk_a, chunk_b);
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

    fn run_on(num_procs: i32) {
        let a_all: Vec<Vector> = (0..num_procs).map(|r| vec![(r + 1) as f64, (r + 2) as f64]).collect();
        let b_all: Vec<Vector> = (0..num_procs).map(|r| vec![(r + 1) as f64]).collect();
        let mut expected = Matrix::zeros(2, 1);
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
                    let ctx = ProcessContext::new(rank as i32, num_procs, 2, 1);
                    let mut result = Matrix::zeros(2, 1);
                    let mut timer = MpiTimer::new();
                    BruckAsync.compute(&comm, &ctx, &a_all, &b_all, &mut result, &mut timer).unwrap();
                    assert_eq!(result, expected);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn matches_oracle_power_of_two() {
        run_on(4);
    }

    #[test]
    fn matches_oracle_non_power_of_two() {
        run_on(5);
    }

    #[test]
    fn matches_oracle_single_rank() {
        run_on(1);
    }
}
