//! Splits the world into `g` subgroups by `rank % g`, all-gathers `A`/`B`
//! across the *whole* world once, then has every subgroup independently
//! compute the *entire* result matrix (partitioning all `n` rows among only
//! its own members via `row_band`) before a second all-gather confined to
//! the subgroup replicates it there. Different subgroups therefore
//! duplicate the local compute work, trading it for a cheaper (smaller)
//! second communication round — the tradeoff the name describes.
//!
//! The subgroup count is a constructor parameter rather than process-wide
//! global state. An out-of-range group count is a configuration error: a
//! caller-supplied `g` outside `1..=P` is a mistake worth surfacing, not
//! silently clamped down to `num_procs`.
//!
//! Works for any process count, not just powers of two.

use dsop_core::{Comm, DsopError, Matrix, ProcessContext, Vector};
use dsop_timing::MpiTimer;

use crate::{row_band, second_phase_allgather, Schedule};

pub struct GrabenseifnerSubgroup {
    groups: i32,
}

impl GrabenseifnerSubgroup {
    pub fn new(groups: i32) -> Self {
        Self { groups }
    }
}

impl Schedule for GrabenseifnerSubgroup {
    fn name(&self) -> &'static str {
        "grabenseifner_subgroup"
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
        if self.groups < 1 || self.groups > ctx.num_procs {
            return Err(DsopError::UnsupportedConfiguration(format!(
                "grabenseifner_subgroup needs 1 <= groups <= num_procs, got groups={}, num_procs={}",
                self.groups, ctx.num_procs
            )));
        }

        let rank = ctx.rank as usize;
        let p = ctx.num_procs as usize;
        let a = &a_all[rank];
        let b = &b_all[rank];
        let color = ctx.rank % self.groups;

        timer.time(|| {
            let mut appended = Vec::with_capacity(ctx.n + ctx.m);
            appended.extend_from_slice(a);
            appended.extend_from_slice(b);
            let mut received = vec![0.0; (ctx.n + ctx.m) * p];
            comm.allgather_into(&appended, &mut received);

            let subgroup = comm.split(color);
            let subgroup_size = subgroup.size() as usize;
            let subgroup_rank = subgroup.rank() as usize;

            let (my_start, my_rows) = row_band(ctx.n, subgroup_size, subgroup_rank);
            if my_rows > 0 {
                for origin in 0..p {
                    let base = origin * (ctx.n + ctx.m);
                    let origin_a = &received[base..base + ctx.n];
                    let origin_b = &received[base + ctx.n..base + ctx.n + ctx.m];
                    result.add_submatrix_outer(my_start, 0, &origin_a[my_start..my_start + my_rows], origin_b);
                }
            }

            second_phase_allgather(subgroup.as_ref(), ctx.n, ctx.m, result);
        });
        Ok(())
    }
}
