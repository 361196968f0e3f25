//! Segmented ring all-reduce: identical chunk rotation to
//! [`crate::AllreduceRing`], but each round's chunk exchange is itself split
//! into fixed-size segments and pipelined — the next segment's send/receive
//! is in flight while the previous segment is folded into `result`, trading
//! a little bookkeeping for lower latency once chunks get large.

use dsop_core::{Comm, DsopError, Matrix, ProcessContext, Vector};
use dsop_timing::MpiTimer;

use crate::tags::ALLREDUCE_RING_PIPELINE;
use crate::Schedule;

/// Default segment size in bytes; exposed as a constructor parameter since
/// the optimal value depends on the transport's eager/rendezvous cutoff.
const DEFAULT_SEG_BYTES: usize = 4096;

pub struct AllreduceRingPipeline {
    seg_el: usize,
}

impl Default for AllreduceRingPipeline {
    fn default() -> Self {
        Self { seg_el: DEFAULT_SEG_BYTES / std::mem::size_of::<f64>() }
    }
}

impl AllreduceRingPipeline {
    pub fn new(seg_el: usize) -> Self {
        assert!(seg_el > 0, "segment size must be positive");
        Self { seg_el }
    }
}

fn chunk_bounds(matrix_size: usize, num_procs: i32, chunk_index: i32) -> (usize, usize) {
    let chunk_size = matrix_size / num_procs as usize;
    let lo = chunk_index as usize * chunk_size;
    let hi = if chunk_index == num_procs - 1 { matrix_size } else { lo + chunk_size };
    (lo, hi)
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

impl Schedule for AllreduceRingPipeline {
    fn name(&self) -> &'static str {
        "allreduce_ring_pipeline"
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

                let send_segs = segments(send_hi - send_lo, self.seg_el);
                let recv_segs = segments(recv_hi - recv_lo, self.seg_el);
                let rounds = send_segs.len().max(recv_segs.len());

                for j in 0..rounds {
                    let send_req = send_segs
                        .get(j)
                        .map(|&(off, len)| comm.isend(dst, ALLREDUCE_RING_PIPELINE, result.as_slice()[send_lo + off..send_lo + off + len].to_vec()));

                    if let Some(&(off, len)) = recv_segs.get(j) {
                        let mut buf = vec![0.0; len];
                        comm.recv_into(src, ALLREDUCE_RING_PIPELINE, &mut buf);
                        if let Some(req) = send_req {
                            req.wait();
                        }
                        for (cell, v) in result.as_mut_slice()[recv_lo + off..recv_lo + off + len].iter_mut().zip(buf.iter()) {
                            *cell += v;
                        }
                    } else if let Some(req) = send_req {
                        req.wait();
                    }
                }
            }

            for i in 0..num_procs - 1 {
                let send_chunk = (rank - i + 1).rem_euclid(num_procs);
                let recv_chunk = (rank - i).rem_euclid(num_procs);
                let (send_lo, send_hi) = chunk_bounds(matrix_size, num_procs, send_chunk);
                let (recv_lo, recv_hi) = chunk_bounds(matrix_size, num_procs, recv_chunk);

                let send_segs = segments(send_hi - send_lo, self.seg_el);
                let recv_segs = segments(recv_hi - recv_lo, self.seg_el);
                let rounds = send_segs.len().max(recv_segs.len());

                for j in 0..rounds {
                    let send_req = send_segs
                        .get(j)
                        .map(|&(off, len)| comm.isend(dst, ALLREDUCE_RING_PIPELINE, result.as_slice()[send_lo + off..send_lo + off + len].to_vec()));

                    if let Some(&(off, len)) = recv_segs.get(j) {
                        let mut buf = vec![0.0; len];
                        comm.recv_into(src, ALLREDUCE_RING_PIPELINE, &mut buf);
                        if let Some(req) = send_req {
                            req.wait();
                        }
                        result.as_mut_slice()[recv_lo + off..recv_lo + off + len].copy_from_slice(&buf);
                    } else if let Some(req) = send_req {
                        req.wait();
                    }
                }
            }
        });
        Ok(())
    }
}
