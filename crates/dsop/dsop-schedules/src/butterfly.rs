//! Recursive-doubling (butterfly) all-reduce over the whole NM-element
//! payload. Non-power-of-two process counts are handled by first folding
//! the idle tail into the power-of-two subgroup, running the butterfly
//! there, then shipping the final matrix back out to the idle ranks.

use dsop_core::{Comm, DsopError, Matrix, ProcessContext, Vector};
use dsop_timing::MpiTimer;

use crate::tags::{ALLREDUCE_BUTTERFLY, ALLREDUCE_BUTTERFLY_REDUCE};
use crate::{ButterflyTopology, Schedule};

pub struct AllreduceButterfly;

impl Schedule for AllreduceButterfly {
    fn name(&self) -> &'static str {
        "allreduce_butterfly"
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
        let topo = ButterflyTopology::new(ctx);

        let mut current = Matrix::outer(&a_all[rank as usize], &b_all[rank as usize]);

        timer.time(|| {
            if topo.is_idle_rank {
                comm.send(topo.idle_partner_rank, ALLREDUCE_BUTTERFLY_REDUCE, current.as_slice());
            }
            if topo.is_idle_partner {
                let mut received = vec![0.0; current.as_slice().len()];
                comm.recv_into(topo.idle_partner_rank, ALLREDUCE_BUTTERFLY_REDUCE, &mut received);
                for (c, r) in current.as_mut_slice().iter_mut().zip(received.iter()) {
                    *c += r;
                }
            }

            if topo.participates() {
                for round in 0..topo.n_rounds {
                    let peer = rank ^ (1 << round);
                    let mut received = vec![0.0; current.as_slice().len()];
                    if rank < peer {
                        comm.send(peer, ALLREDUCE_BUTTERFLY, current.as_slice());
                        comm.recv_into(peer, ALLREDUCE_BUTTERFLY, &mut received);
                    } else {
                        comm.recv_into(peer, ALLREDUCE_BUTTERFLY, &mut received);
                        comm.send(peer, ALLREDUCE_BUTTERFLY, current.as_slice());
                    }
                    for (c, r) in current.as_mut_slice().iter_mut().zip(received.iter()) {
                        *c += r;
                    }
                }
            }

            if topo.is_idle_partner {
                comm.send(topo.idle_partner_rank, ALLREDUCE_BUTTERFLY_REDUCE, current.as_slice());
            }
            if topo.is_idle_rank {
                let mut received = vec![0.0; current.as_slice().len()];
                comm.recv_into(topo.idle_partner_rank, ALLREDUCE_BUTTERFLY_REDUCE, &mut received);
                current.as_mut_slice().copy_from_slice(&received);
            }
        });

        result.as_mut_slice().copy_from_slice(current.as_slice());
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
                    AllreduceButterfly.compute(&comm, &ctx, &a_all, &b_all, &mut result, &mut timer).unwrap();
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
        run_on(4, 3, 2);
    }

    #[test]
    fn matches_oracle_non_power_of_two() {
        run_on(6, 3, 2);
    }

    #[test]
    fn matches_oracle_single_rank() {
        run_on(1, 2, 2);
    }
}
