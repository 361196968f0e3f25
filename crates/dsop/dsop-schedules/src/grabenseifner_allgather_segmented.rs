//! `grabenseifner_allgather`, but with the two gathered quantities treated
//! asymmetrically: `A` is all-gathered once as a single small transfer,
//! while `B` is split into fixed-size column segments whose all-gather is
//! pipelined against the outer-product compute loop — the next segment's
//! point-to-point sends/receives are posted before the current segment's
//! contribution is folded into `result`, so transport and compute overlap
//! the way [`crate::AllgatherAsync`]'s single round does, just repeated
//! once per segment.
//!
//! Falls back to a single "segment" spanning the whole of `B` when the
//! payload is smaller than one segment, which degenerates to one pipeline
//! step with nothing left to overlap it against.
//!
//! Works for any process count, not just powers of two.

use dsop_core::{Comm, DsopError, Matrix, PendingRecv, PendingSend, ProcessContext, Vector};
use dsop_timing::MpiTimer;

use crate::tags::GRABENSEIFNER_ALLGATHER_SEGMENTED;
use crate::{row_band, second_phase_allgather, Schedule};

/// Default segment size in bytes; exposed as a constructor parameter since
/// the optimal value depends on the transport's eager/rendezvous cutoff.
const DEFAULT_SEG_BYTES: usize = 1 << 17;

pub struct GrabenseifnerAllgatherSegmented {
    seg_el: usize,
}

impl Default for GrabenseifnerAllgatherSegmented {
    fn default() -> Self {
        Self { seg_el: DEFAULT_SEG_BYTES / std::mem::size_of::<f64>() }
    }
}

impl GrabenseifnerAllgatherSegmented {
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

/// One segment's worth of `B`'s all-gather in flight: a pending send to
/// every peer plus a pending receive slot per peer (`rank`'s own slot is
/// filled locally and never posted).
struct InFlightSegment {
    off: usize,
    len: usize,
    sends: Vec<Box<dyn PendingSend>>,
    recvs: Vec<Option<Box<dyn PendingRecv>>>,
}

impl Schedule for GrabenseifnerAllgatherSegmented {
    fn name(&self) -> &'static str {
        "grabenseifner_allgather_segmented"
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
            // A is small: all-gather it in a single transfer, not segmented.
            let mut a_received = vec![0.0; ctx.n * p];
            comm.allgather_into(a, &mut a_received);

            let (my_start, my_rows) = row_band(ctx.n, p, rank);
            let segs = segments(ctx.m, self.seg_el);

            let post = |off: usize, len: usize| -> InFlightSegment {
                let mut sends = Vec::with_capacity(p.saturating_sub(1));
                let mut recvs: Vec<Option<Box<dyn PendingRecv>>> = (0..p).map(|_| None).collect();
                for peer in 0..p {
                    if peer == rank {
                        continue;
                    }
                    sends.push(comm.isend(
                        peer as i32,
                        GRABENSEIFNER_ALLGATHER_SEGMENTED,
                        b[off..off + len].to_vec(),
                    ));
                    recvs[peer] = Some(comm.irecv(peer as i32, GRABENSEIFNER_ALLGATHER_SEGMENTED, len));
                }
                InFlightSegment { off, len, sends, recvs }
            };

            // Post the first segment up front so the loop body can always
            // post the *next* segment before waiting on the *current* one.
            let mut idx = 0usize;
            let mut current = segs.first().map(|&(off, len)| post(off, len));

            while let Some(in_flight) = current.take() {
                current = segs.get(idx + 1).map(|&(off, len)| post(off, len));
                idx += 1;

                let InFlightSegment { off, len, sends, mut recvs } = in_flight;
                let mut seg_data = vec![0.0; len * p];
                seg_data[rank * len..(rank + 1) * len].copy_from_slice(&b[off..off + len]);
                for peer in 0..p {
                    if peer == rank {
                        continue;
                    }
                    let payload = recvs[peer].take().unwrap().wait();
                    seg_data[peer * len..(peer + 1) * len].copy_from_slice(&payload);
                }
                for s in sends {
                    s.wait();
                }

                if my_rows > 0 {
                    for origin in 0..p {
                        let origin_a = &a_received[origin * ctx.n..(origin + 1) * ctx.n];
                        let origin_b_seg = &seg_data[origin * len..(origin + 1) * len];
                        result.add_submatrix_outer(
                            my_start,
                            off,
                            &origin_a[my_start..my_start + my_rows],
                            origin_b_seg,
                        );
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
                    GrabenseifnerAllgatherSegmented::new(seg_el)
                        .compute(&comm, &ctx, &a_all, &b_all, &mut result, &mut timer)
                        .unwrap();
                    assert_eq!(result, expected);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn matches_oracle_tiny_segments() {
        run_on(4, 8, 3, 2);
    }

    #[test]
    fn matches_oracle_many_segments_pipelined() {
        run_on(4, 8, 17, 3);
    }

    #[test]
    fn matches_oracle_segment_larger_than_payload() {
        run_on(3, 7, 4, 4096);
    }

    #[test]
    fn matches_oracle_with_residual_rows() {
        run_on(3, 10, 2, 3);
    }

    #[test]
    fn matches_oracle_single_rank() {
        run_on(1, 3, 3, 4);
    }
}
