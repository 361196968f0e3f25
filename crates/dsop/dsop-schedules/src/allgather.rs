//! Concatenate each rank's `A_r || B_r` into one vector, all-gather those,
//! then reconstruct every outer product locally. One collective call
//! replaces the two-buffer-gather-then-zip the naive split version would
//! need.

use dsop_core::{Comm, DsopError, Matrix, ProcessContext, Vector};
use dsop_timing::MpiTimer;

use crate::Schedule;

pub struct Allgather;

impl Schedule for Allgather {
    fn name(&self) -> &'static str {
        "allgather"
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
        let stride = n + m;

        let mut send = Vec::with_capacity(stride);
        send.extend_from_slice(&a_all[ctx.rank as usize]);
        send.extend_from_slice(&b_all[ctx.rank as usize]);

        let mut recv = vec![0.0; stride * ctx.num_procs as usize];
        timer.time(|| {
            comm.allgather_into(&send, &mut recv);
        });

        for k in 0..ctx.num_procs as usize {
            let chunk = &recv[k * stride..(k + 1) * stride];
            result.add_outer(&chunk[..n], &chunk[n..]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsop_core::ThreadComm;
    use std::thread;

    #[test]
    fn matches_oracle_on_three_ranks() {
        let a_all: Vec<Vector> = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let b_all: Vec<Vector> = vec![vec![1.0], vec![2.0], vec![3.0]];
        let mut expected = Matrix::zeros(2, 1);
        dsop_oracle::compute(&a_all, &b_all, &mut expected);

        let comms = ThreadComm::new_group(3);
        let handles: Vec<_> = comms
            .into_iter()
            .enumerate()
            .map(|(rank, comm)| {
                let a_all = a_all.clone();
                let b_all = b_all.clone();
                let expected = expected.clone();
                thread::spawn(move || {
                    let ctx = ProcessContext::new(rank as i32, 3, 2, 1);
                    let mut result = Matrix::zeros(2, 1);
                    let mut timer = MpiTimer::new();
                    Allgather.compute(&comm, &ctx, &a_all, &b_all, &mut result, &mut timer).unwrap();
                    assert_eq!(result, expected);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
