//! Rabenseifner variant that partitions the result by contiguous row
//! bands instead of by flat index range. A vector-gather stage ships each
//! rank the row-slice of every other rank's `A` plus its full `B`, so every
//! rank can compute its own row band directly; a butterfly all-gather over
//! row-band-sized chunks then replicates the assembled bands everywhere.
//!
//! Requires a power-of-two process count (no idle-partner folding here,
//! unlike `allreduce_butterfly`) and at least as many rows as ranks, since
//! every rank owns at least one row of the band partition.

use dsop_core::{Comm, DsopError, Matrix, ProcessContext, Vector};
use dsop_timing::MpiTimer;

use crate::tags::{RABENSEIFNER_GATHER, RABENSEIFNER_GATHER_VEC_A, RABENSEIFNER_GATHER_VEC_B};
use crate::{n_rounds, row_band, Schedule};

pub struct RabenseifnerGather;

impl Schedule for RabenseifnerGather {
    fn name(&self) -> &'static str {
        "rabenseifner_gather"
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
                "rabenseifner_gather requires a power-of-two process count, got {}",
                ctx.num_procs
            )));
        }
        if ctx.n < ctx.num_procs as usize {
            return Err(DsopError::UnsupportedConfiguration(format!(
                "rabenseifner_gather needs at least as many rows as ranks: n={}, num_procs={}",
                ctx.n, ctx.num_procs
            )));
        }

        let rank = ctx.rank;
        let p = ctx.num_procs as usize;
        let a = &a_all[rank as usize];
        let b = &b_all[rank as usize];
        let (my_start, my_rows) = row_band(ctx.n, p, rank as usize);

        timer.time(|| {
            // [VECTOR-GATHER STAGE] ship every other rank the row slice of my
            // A it needs, plus my full B; receive theirs and fold the outer
            // product straight into my own row band.
            let mut sends = Vec::new();
            for i in 0..p {
                if i == rank as usize {
                    continue;
                }
                let (start, rows) = row_band(ctx.n, p, i);
                sends.push(comm.isend(i as i32, RABENSEIFNER_GATHER_VEC_A, a[start..start + rows].to_vec()));
                sends.push(comm.isend(i as i32, RABENSEIFNER_GATHER_VEC_B, b.clone()));
            }

            if my_rows > 0 {
                let my_a_slice = &a[my_start..my_start + my_rows];
                result.add_submatrix_outer(my_start, 0, my_a_slice, b);
            }
            for i in 0..p {
                if i == rank as usize {
                    continue;
                }
                let mut recv_a = vec![0.0; my_rows];
                let mut recv_b = vec![0.0; ctx.m];
                comm.recv_into(i as i32, RABENSEIFNER_GATHER_VEC_A, &mut recv_a);
                comm.recv_into(i as i32, RABENSEIFNER_GATHER_VEC_B, &mut recv_b);
                if my_rows > 0 {
                    result.add_submatrix_outer(my_start, 0, &recv_a, &recv_b);
                }
            }
            for s in sends {
                s.wait();
            }

            // [BUTTERFLY ALL-GATHER] exchange row-band-shaped chunks so every
            // rank ends up with the full matrix. Chunk `k` spans
            // `row_band(n, p, k)` rows; the XOR topology mirrors
            // `allreduce_rabenseifner`'s index-table bisection, just over
            // chunks-of-rows instead of raw element ranges.
            let rounds = n_rounds(ctx.num_procs);
            if rounds == 0 {
                return;
            }

            let mut lower = 0usize;
            let mut upper = p;
            let mut send_lo = vec![0usize; rounds as usize];
            let mut send_hi = vec![0usize; rounds as usize];
            let mut recv_lo = vec![0usize; rounds as usize];
            let mut recv_hi = vec![0usize; rounds as usize];
            for round in (0..rounds).rev() {
                let mid = (lower + upper + 1) / 2;
                if (rank as usize) < mid {
                    recv_lo[round as usize] = lower;
                    recv_hi[round as usize] = mid;
                    send_lo[round as usize] = mid;
                    send_hi[round as usize] = upper;
                    upper = mid;
                } else {
                    send_lo[round as usize] = lower;
                    send_hi[round as usize] = mid;
                    recv_lo[round as usize] = mid;
                    recv_hi[round as usize] = upper;
                    lower = mid;
                }
            }

            // Maps a chunk-boundary index (0..=p, where chunk `k` spans rows
            // `row_band(n, p, k)`) to the absolute row offset at that boundary.
            let boundary_row = |bound: usize| if bound == p { ctx.n } else { row_band(ctx.n, p, bound).0 };

            for round in 0..rounds {
                let peer = rank ^ (1 << round);
                let r = round as usize;
                let (sl, sh) = (boundary_row(send_lo[r]), boundary_row(send_hi[r]));
                let (rl, rh) = (boundary_row(recv_lo[r]), boundary_row(recv_hi[r]));
                let send_slice = &result.as_slice()[sl * ctx.m..sh * ctx.m];
                let mut received = vec![0.0; (rh - rl) * ctx.m];
                if rank < peer {
                    comm.send(peer, RABENSEIFNER_GATHER, send_slice);
                    comm.recv_into(peer, RABENSEIFNER_GATHER, &mut received);
                } else {
                    comm.recv_into(peer, RABENSEIFNER_GATHER, &mut received);
                    comm.send(peer, RABENSEIFNER_GATHER, send_slice);
                }
                result.as_mut_slice()[rl * ctx.m..rh * ctx.m].copy_from_slice(&received);
            }
        });
        Ok(())
    }
}
