//! Pipelined butterfly all-reduce: round 0 is one blocking exchange of the
//! whole payload; every later round splits the payload into fixed-size
//! segments so the previous round's received data is folded into `result`
//! one segment at a time while that segment's replacement is already in
//! flight for the current round.

use dsop_core::{Comm, DsopError, Matrix, PendingSend, ProcessContext, Vector};
use dsop_timing::MpiTimer;

use crate::tags::{ALLREDUCE_BUTTERFLY_SEGMENTED, ALLREDUCE_BUTTERFLY_SEGMENTED_REDUCE};
use crate::{ButterflyTopology, Schedule};

/// Default segment size in bytes; exposed as a constructor parameter since
/// the optimal value depends on the transport's eager/rendezvous cutoff.
const DEFAULT_SEG_BYTES: usize = 1 << 17;

pub struct AllreduceButterflySegmented {
    seg_el: usize,
}

impl Default for AllreduceButterflySegmented {
    fn default() -> Self {
        Self { seg_el: DEFAULT_SEG_BYTES / std::mem::size_of::<f64>() }
    }
}

impl AllreduceButterflySegmented {
    pub fn new(seg_el: usize) -> Self {
        assert!(seg_el > 0, "segment size must be positive");
        Self { seg_el }
    }
}

fn segments(len: usize, seg_el: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut off = 0;
    while off < len {
        let l = seg_el.min(len - off);
        out.push((off, l));
        off += l;
    }
    out
}

impl Schedule for AllreduceButterflySegmented {
    fn name(&self) -> &'static str {
        "allreduce_butterfly_segmented"
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
        let len = ctx.n * ctx.m;

        result.set_outer(&a_all[rank as usize], &b_all[rank as usize]);

        if ctx.num_procs == 1 {
            return Ok(());
        }

        timer.time(|| {
            if topo.is_idle_rank {
                comm.send(topo.idle_partner_rank, ALLREDUCE_BUTTERFLY_SEGMENTED_REDUCE, result.as_slice());
            } else if topo.is_idle_partner {
                let mut received = vec![0.0; len];
                comm.recv_into(topo.idle_partner_rank, ALLREDUCE_BUTTERFLY_SEGMENTED_REDUCE, &mut received);
                for (c, r) in result.as_mut_slice().iter_mut().zip(received.iter()) {
                    *c += r;
                }
            }

            if topo.participates() {
                let peer0 = rank ^ 1;
                let mut pending = vec![0.0; len];
                comm.sendrecv_into(
                    peer0,
                    ALLREDUCE_BUTTERFLY_SEGMENTED,
                    result.as_slice(),
                    peer0,
                    ALLREDUCE_BUTTERFLY_SEGMENTED,
                    &mut pending,
                );

                for round in 1..topo.n_rounds {
                    let peer = rank ^ (1 << round);
                    let segs = segments(len, self.seg_el);
                    let mut new_pending = vec![0.0; len];
                    let mut send_req: Option<Box<dyn PendingSend>> = None;

                    for &(off, l) in &segs {
                        for (c, p) in result.as_mut_slice()[off..off + l].iter_mut().zip(pending[off..off + l].iter()) {
                            *c += p;
                        }
                        if let Some(req) = send_req.take() {
                            req.wait();
                        }
                        send_req = Some(comm.isend(peer, ALLREDUCE_BUTTERFLY_SEGMENTED, result.as_slice()[off..off + l].to_vec()));
                        comm.recv_into(peer, ALLREDUCE_BUTTERFLY_SEGMENTED, &mut new_pending[off..off + l]);
                    }
                    if let Some(req) = send_req.take() {
                        req.wait();
                    }
                    pending = new_pending;
                }

                for (c, p) in result.as_mut_slice().iter_mut().zip(pending.iter()) {
                    *c += p;
                }
            }

            if topo.is_idle_partner {
                comm.send(topo.idle_partner_rank, ALLREDUCE_BUTTERFLY_SEGMENTED_REDUCE, result.as_slice());
            } else if topo.is_idle_rank {
                let mut received = vec![0.0; len];
                comm.recv_into(topo.idle_partner_rank, ALLREDUCE_BUTTERFLY_SEGMENTED_REDUCE, &mut received);
                result.as_mut_slice().copy_from_slice(&received);
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

    fn run_on(num_procs: i32, n: usize, m: usize, seg_el: usize) {
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
                    AllreduceButterflySegmented::new(seg_el).compute(&comm, &ctx, &a_all, &b_all, &mut result, &mut timer).unwrap();
                    assert_eq!(result, expected);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn matches_oracle_power_of_two_tiny_segments() {
        run_on(8, 3, 3, 2);
    }

    #[test]
    fn matches_oracle_non_power_of_two() {
        run_on(6, 2, 2, 4);
    }

    #[test]
    fn matches_oracle_two_ranks_single_round() {
        run_on(2, 2, 2, 4);
    }

    #[test]
    fn matches_oracle_single_rank() {
        run_on(1, 2, 2, 4);
    }
}
