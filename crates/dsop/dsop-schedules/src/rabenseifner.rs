//! Rabenseifner all-reduce: a butterfly reduce-scatter over shrinking index
//! ranges of the flattened NM matrix, followed by a butterfly all-gather
//! over the same ranges in reverse. Requires a power-of-two process count.

use dsop_core::{Comm, DsopError, Matrix, ProcessContext, Vector};
use dsop_timing::MpiTimer;

use crate::tags::ALLREDUCE_RABENSEIFNER;
use crate::{n_rounds, Schedule};

pub struct AllreduceRabenseifner;

/// Per-round bucket bounds (bucket index into the `P2 + 1`-long index
/// table, not raw element offsets) computed by halving `[0, P2)`
/// top-down, so round `n_rounds-1` splits the widest range first.
fn round_buckets(rank: i32, p2: i32, rounds: u32) -> (Vec<i32>, Vec<i32>, Vec<i32>, Vec<i32>) {
    let mut send_lo = vec![0; rounds as usize];
    let mut send_hi = vec![0; rounds as usize];
    let mut recv_lo = vec![0; rounds as usize];
    let mut recv_hi = vec![0; rounds as usize];

    let mut current_lower = 0;
    let mut current_upper = p2;
    for round in (0..rounds).rev() {
        let middle = (current_lower + current_upper + 1) / 2;
        if rank < middle {
            recv_lo[round as usize] = current_lower;
            recv_hi[round as usize] = middle;
            send_lo[round as usize] = middle;
            send_hi[round as usize] = current_upper;
            current_upper = middle;
        } else {
            send_lo[round as usize] = current_lower;
            send_hi[round as usize] = middle;
            recv_lo[round as usize] = middle;
            recv_hi[round as usize] = current_upper;
            current_lower = middle;
        }
    }
    (send_lo, send_hi, recv_lo, recv_hi)
}

impl Schedule for AllreduceRabenseifner {
    fn name(&self) -> &'static str {
        "allreduce_rabenseifner"
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
        if !ctx.is_power_of_two() {
            return Err(DsopError::UnsupportedConfiguration(format!(
                "allreduce_rabenseifner requires a power-of-two process count, got {}",
                ctx.num_procs
            )));
        }

        let rank = ctx.rank;
        let p2 = ctx.num_procs;
        let rounds = n_rounds(p2);
        let matrix_size = ctx.n * ctx.m;

        result.set_outer(&a_all[rank as usize], &b_all[rank as usize]);

        if p2 == 1 {
            return Ok(());
        }

        let chunk_size = matrix_size / p2 as usize;
        let mut all_indices = vec![0usize; p2 as usize + 1];
        for i in 1..p2 as usize {
            all_indices[i] = i * chunk_size;
        }
        all_indices[p2 as usize] = matrix_size;

        let (send_lo, send_hi, recv_lo, recv_hi) = round_buckets(rank, p2, rounds);

        timer.time(|| {
            for round in (0..rounds).rev() {
                let peer = rank ^ (1 << round);
                let r = round as usize;
                let (sl, sh) = (all_indices[send_lo[r] as usize], all_indices[send_hi[r] as usize]);
                let (rl, rh) = (all_indices[recv_lo[r] as usize], all_indices[recv_hi[r] as usize]);

                let mut received = vec![0.0; rh - rl];
                if rank < peer {
                    comm.send(peer, ALLREDUCE_RABENSEIFNER, &result.as_slice()[sl..sh]);
                    comm.recv_into(peer, ALLREDUCE_RABENSEIFNER, &mut received);
                } else {
                    comm.recv_into(peer, ALLREDUCE_RABENSEIFNER, &mut received);
                    comm.send(peer, ALLREDUCE_RABENSEIFNER, &result.as_slice()[sl..sh]);
                }
                for (c, v) in result.as_mut_slice()[rl..rh].iter_mut().zip(received.iter()) {
                    *c += v;
                }
            }

            for round in 0..rounds {
                let peer = rank ^ (1 << round);
                let r = round as usize;
                // Phase B reverses the roles: this round's gather-send range is
                // what was received in phase A, and vice versa.
                let (sl, sh) = (all_indices[recv_lo[r] as usize], all_indices[recv_hi[r] as usize]);
                let (rl, rh) = (all_indices[send_lo[r] as usize], all_indices[send_hi[r] as usize]);

                let mut received = vec![0.0; rh - rl];
                if rank < peer {
                    comm.send(peer, ALLREDUCE_RABENSEIFNER, &result.as_slice()[sl..sh]);
                    comm.recv_into(peer, ALLREDUCE_RABENSEIFNER, &mut received);
                } else {
                    comm.recv_into(peer, ALLREDUCE_RABENSEIFNER, &mut received);
                    comm.send(peer, ALLREDUCE_RABENSEIFNER, &result.as_slice()[sl..sh]);
                }
                result.as_mut_slice()[rl..rh].copy_from_slice(&received);
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
                    AllreduceRabenseifner.compute(&comm, &ctx, &a_all, &b_all, &mut result, &mut timer).unwrap();
                    assert_eq!(result, expected);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn matches_oracle_eight_ranks() {
        run_on(8, 5, 3);
    }

    #[test]
    fn matches_oracle_single_rank() {
        run_on(1, 2, 2);
    }

    #[test]
    fn rejects_non_power_of_two() {
        let comms = ThreadComm::new_group(3);
        let comm = &comms[0];
        let ctx = ProcessContext::new(0, 3, 2, 2);
        let mut result = Matrix::zeros(2, 2);
        let mut timer = MpiTimer::new();
        let a_all = vec![vec![1.0, 2.0]; 3];
        let b_all = vec![vec![1.0, 2.0]; 3];
        let err = AllreduceRabenseifner.compute(comm, &ctx, &a_all, &b_all, &mut result, &mut timer).unwrap_err();
        assert!(matches!(err, DsopError::UnsupportedConfiguration(_)));
    }
}
