//! `Comm` bound to the real `mpi` (rsmpi) crate.
//!
//! rsmpi's non-blocking `immediate_send`/`immediate_receive` API ties the
//! returned `Request` to the lifetime of the buffer it borrows (via
//! `mpi::request::scope`), which does not fit a `Box<dyn PendingSend>` that
//! schedules hold across arbitrary control flow. Rather than fighting that
//! lifetime with `unsafe`, `isend`/`irecv` here hand the owned buffer to a
//! dedicated OS thread that performs a plain *blocking* `mpi` call; the
//! `ThreadedSend`/`ThreadedRecv` wrapper (shared with `ThreadComm`) turns
//! that into the same non-blocking-request shape the rest of the crate
//! expects. This requires the process to have been initialized with
//! `Threading::Multiple` (see `bins/dsop-bench`), since `MpiComm` methods
//! can now be invoked concurrently from the calling thread and the
//! send/recv helper thread.

use mpi::collective::SystemOperation;
use mpi::point_to_point as p2p;
use mpi::topology::{Communicator, SimpleCommunicator, SystemCommunicator};

use super::threaded_request::{ThreadedRecv, ThreadedSend};
use super::{Comm, PendingRecv, PendingSend};

/// Either the world communicator or a sub-communicator produced by `split`.
/// Both implement `mpi`'s `Communicator` trait; kept as an enum (rather than
/// a trait object, since `Communicator` has generic methods and is not
/// object-safe) so `MpiComm` can be constructed from either.
enum Group {
    World(SystemCommunicator),
    Split(SimpleCommunicator),
}

impl Clone for Group {
    fn clone(&self) -> Self {
        match self {
            Group::World(w) => Group::World(*w),
            Group::Split(s) => Group::Split(s.clone()),
        }
    }
}

pub struct MpiComm {
    group: Group,
}

impl MpiComm {
    pub fn world(world: SystemCommunicator) -> Self {
        Self { group: Group::World(world) }
    }

    fn rank_process(&self, rank: i32) -> mpi::topology::Process<'_> {
        match &self.group {
            Group::World(w) => w.process_at_rank(rank),
            Group::Split(s) => s.process_at_rank(rank),
        }
    }
}

impl Comm for MpiComm {
    fn rank(&self) -> i32 {
        match &self.group {
            Group::World(w) => w.rank(),
            Group::Split(s) => s.rank(),
        }
    }

    fn size(&self) -> i32 {
        match &self.group {
            Group::World(w) => w.size(),
            Group::Split(s) => s.size(),
        }
    }

    fn wtime(&self) -> f64 {
        mpi::time()
    }

    fn barrier(&self) {
        match &self.group {
            Group::World(w) => w.barrier(),
            Group::Split(s) => s.barrier(),
        }
    }

    fn send(&self, dest: i32, tag: i32, buf: &[f64]) {
        self.rank_process(dest).send_with_tag(buf, tag);
    }

    fn recv_into(&self, src: i32, tag: i32, buf: &mut [f64]) {
        self.rank_process(src).receive_into_with_tag(buf, tag);
    }

    fn sendrecv_into(
        &self,
        dest: i32,
        send_tag: i32,
        send_buf: &[f64],
        src: i32,
        recv_tag: i32,
        recv_buf: &mut [f64],
    ) {
        p2p::send_receive_into_with_tags(
            send_buf,
            &self.rank_process(dest),
            send_tag,
            recv_buf,
            &self.rank_process(src),
            recv_tag,
        );
    }

    fn isend(&self, dest: i32, tag: i32, buf: Vec<f64>) -> Box<dyn PendingSend> {
        let group = self.group.clone();
        Box::new(ThreadedSend::spawn(move || {
            let comm = MpiComm { group };
            comm.send(dest, tag, &buf);
        }))
    }

    fn irecv(&self, src: i32, tag: i32, len: usize) -> Box<dyn PendingRecv> {
        let group = self.group.clone();
        Box::new(ThreadedRecv::spawn(move || {
            let comm = MpiComm { group };
            let mut buf = vec![0.0; len];
            comm.recv_into(src, tag, &mut buf);
            buf
        }))
    }

    fn allreduce_sum_into(&self, send: &[f64], recv: &mut [f64]) {
        match &self.group {
            Group::World(w) => w.all_reduce_into(send, recv, SystemOperation::sum()),
            Group::Split(s) => s.all_reduce_into(send, recv, SystemOperation::sum()),
        }
    }

    fn allgather_into(&self, send: &[f64], recv: &mut [f64]) {
        match &self.group {
            Group::World(w) => w.all_gather_into(send, recv),
            Group::Split(s) => s.all_gather_into(send, recv),
        }
    }

    fn scatter_from_root_into(&self, root: i32, send: &[f64], recv: &mut [f64]) {
        let is_root = self.rank() == root;
        match &self.group {
            Group::World(w) => {
                let r = w.process_at_rank(root);
                if is_root {
                    r.scatter_into_root(send, recv);
                } else {
                    r.scatter_into(recv);
                }
            }
            Group::Split(s) => {
                let r = s.process_at_rank(root);
                if is_root {
                    r.scatter_into_root(send, recv);
                } else {
                    r.scatter_into(recv);
                }
            }
        }
    }

    fn gather_to_root_into(&self, root: i32, send: &[f64], recv: &mut [f64]) {
        let is_root = self.rank() == root;
        match &self.group {
            Group::World(w) => {
                let r = w.process_at_rank(root);
                if is_root {
                    r.gather_into_root(send, recv);
                } else {
                    r.gather_into(send);
                }
            }
            Group::Split(s) => {
                let r = s.process_at_rank(root);
                if is_root {
                    r.gather_into_root(send, recv);
                } else {
                    r.gather_into(send);
                }
            }
        }
    }

    fn bcast_into(&self, root: i32, buf: &mut [f64]) {
        match &self.group {
            Group::World(w) => w.process_at_rank(root).broadcast_into(buf),
            Group::Split(s) => s.process_at_rank(root).broadcast_into(buf),
        }
    }

    fn split(&self, color: i32) -> Box<dyn Comm> {
        let sub = match &self.group {
            Group::World(w) => w.split_by_color(mpi::topology::Color::with_value(color)),
            Group::Split(s) => s.split_by_color(mpi::topology::Color::with_value(color)),
        }
        .expect("communicator split must succeed: every rank passes a valid non-negative color");
        Box::new(MpiComm { group: Group::Split(sub) })
    }
}
