//! Textbook baseline: every rank computes its own local outer product, then
//! a single `allreduce_sum_into` call sums the flattened matrices across the
//! whole group. No schedule in this library is allowed to be slower to
//! write than this one; it exists as the correctness anchor the others are
//! checked against.

use dsop_core::{Comm, DsopError, Matrix, ProcessContext, Vector};
use dsop_timing::MpiTimer;

use crate::Schedule;

pub struct Allreduce;

impl Schedule for Allreduce {
    fn name(&self) -> &'static str {
        "allreduce"
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
        let mut local = Matrix::zeros(ctx.n, ctx.m);
        local.add_outer(&a_all[ctx.rank as usize], &b_all[ctx.rank as usize]);

        timer.time(|| {
            comm.allreduce_sum_into(local.as_slice(), result.as_mut_slice());
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsop_core::ThreadComm;
    use std::thread;

    #[test]
    fn matches_oracle_on_four_ranks() {
        let a_all: Vec<Vector> = (0..4).map(|r| vec![(r + 1) as f64, (r + 2) as f64]).collect();
        let b_all: Vec<Vector> = (0..4).map(|r| vec![(r + 1) as f64]).collect();
        let mut expected = Matrix::zeros(2, 1);
        dsop_oracle::compute(&a_all, &b_all, &mut expected);

        let comms = ThreadComm::new_group(4);
        let handles: Vec<_> = comms
            .into_iter()
            .enumerate()
            .map(|(rank, comm)| {
                let a_all = a_all.clone();
                let b_all = b_all.clone();
                let expected = expected.clone();
                thread::spawn(move || {
                    let ctx = ProcessContext::new(rank as i32, 4, 2, 1);
                    let mut result = Matrix::zeros(2, 1);
                    let mut timer = MpiTimer::new();
                    Allreduce.compute(&comm, &ctx, &a_all, &b_all, &mut result, &mut timer).unwrap();
                    assert_eq!(result, expected);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
