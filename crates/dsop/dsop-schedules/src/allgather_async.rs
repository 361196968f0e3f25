//! Non-blocking variant of [`crate::Allgather`]: the local outer product is
//! folded in immediately, then P-1 sends and P-1 receives of the
//! concatenated vector are posted up front and drained as they complete, so
//! each peer's contribution is reduced in as soon as it lands rather than
//! waiting for every peer to arrive.

use dsop_core::{Comm, DsopError, Matrix, PendingRecv, PendingSend, ProcessContext, Vector};
use dsop_timing::MpiTimer;

use crate::tags::ALLGATHER_ASYNC;
use crate::Schedule;

pub struct AllgatherAsync;

impl Schedule for AllgatherAsync {
    fn name(&self) -> &'static str {
        "allgather_async"
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
        let rank = ctx.rank;
        let size = ctx.num_procs;

        let mut send = Vec::with_capacity(stride);
        send.extend_from_slice(&a_all[rank as usize]);
        send.extend_from_slice(&b_all[rank as usize]);

        timer.time(|| {
            result.add_outer(&send[..n], &send[n..]);

            let mut sends: Vec<Box<dyn PendingSend>> = Vec::with_capacity((size - 1) as usize);
            let mut recvs: Vec<Option<Box<dyn PendingRecv>>> = Vec::with_capacity((size - 1) as usize);
            for peer in 0..size {
                if peer == rank {
                    continue;
                }
                sends.push(comm.isend(peer, ALLGATHER_ASYNC, send.clone()));
                recvs.push(Some(comm.irecv(peer, ALLGATHER_ASYNC, stride)));
            }

            let mut pending = recvs;
            while pending.iter().any(Option::is_some) {
                let (_idx, payload) = comm.wait_any_recv(&mut pending);
                result.add_outer(&payload[..n], &payload[n..]);
            }

            for s in sends {
                s.wait();
            }
        });
        Ok(())
    }
}
