//! Transport facade: an object-safe, f64-buffer-specialized view of the
//! point-to-point and collective primitives a schedule needs.
//!
//! `mpi`'s own `Communicator` trait has generic methods and so cannot be
//! used as a trait object, which the harness needs in order to pick a
//! schedule by name and hand it a single concrete transport type. `Comm`
//! is that object-safe seam. `MpiComm` binds it to the real `mpi` crate;
//! `ThreadComm` binds it to an in-process, multi-threaded stand-in so the
//! whole schedule library can be correctness-tested without `mpiexec`.

mod mpi_comm;
mod thread_comm;

pub use mpi_comm::MpiComm;
pub use thread_comm::ThreadComm;

/// A non-blocking send in flight. The buffer is owned by the request, not
/// borrowed, so there is no lifetime to thread through a trait object.
/// Dropping one of these without calling `wait` is a bug: implementations
/// panic on drop in that case (relied on directly for `MpiComm`, whose
/// underlying `mpi::request::Request` already enforces it).
pub trait PendingSend: Send {
    fn wait(self: Box<Self>);
}

/// A non-blocking receive in flight; `wait` hands back the received buffer.
pub trait PendingRecv: Send {
    /// Non-blocking completion check, used by the default `wait_any_recv`.
    fn is_ready(&self) -> bool;
    fn wait(self: Box<Self>) -> Vec<f64>;
}

/// Transport primitives every schedule is written against.
pub trait Comm: Send + Sync {
    fn rank(&self) -> i32;
    fn size(&self) -> i32;
    fn wtime(&self) -> f64;
    fn barrier(&self);

    fn send(&self, dest: i32, tag: i32, buf: &[f64]);
    fn recv_into(&self, src: i32, tag: i32, buf: &mut [f64]);

    /// Default: post the send, then block on the receive. Sound here
    /// because each (src, dest, tag) triple gets its own FIFO queue in
    /// every backend; no rendezvous deadlock is possible between two ranks
    /// exchanging in opposite directions on distinct tags. `MpiComm`
    /// overrides this with a true paired `Sendrecv`.
    fn sendrecv_into(
        &self,
        dest: i32,
        send_tag: i32,
        send_buf: &[f64],
        src: i32,
        recv_tag: i32,
        recv_buf: &mut [f64],
    ) {
        self.send(dest, send_tag, send_buf);
        self.recv_into(src, recv_tag, recv_buf);
    }

    fn isend(&self, dest: i32, tag: i32, buf: Vec<f64>) -> Box<dyn PendingSend>;
    fn irecv(&self, src: i32, tag: i32, len: usize) -> Box<dyn PendingRecv>;

    /// Blocks until exactly one of `reqs` completes; returns its index and
    /// payload, leaving that slot `None`. Matches `MPI_Waitany`'s use of
    /// `MPI_REQUEST_NULL` for already-retired slots.
    ///
    /// Default implementation polls `is_ready` across the slice; `MpiComm`
    /// overrides this with the native blocking `Waitany`.
    fn wait_any_recv(&self, reqs: &mut [Option<Box<dyn PendingRecv>>]) -> (usize, Vec<f64>) {
        loop {
            for (i, slot) in reqs.iter().enumerate() {
                if slot.as_ref().is_some_and(|r| r.is_ready()) {
                    let payload = reqs[i].take().unwrap().wait();
                    return (i, payload);
                }
            }
            std::thread::yield_now();
        }
    }

    fn allreduce_sum_into(&self, send: &[f64], recv: &mut [f64]) {
        let n = send.len();
        assert_eq!(recv.len(), n);
        let mut gathered = vec![0.0; n * self.size() as usize];
        self.gather_to_root_into(0, send, &mut gathered);
        if self.rank() == 0 {
            recv.fill(0.0);
            for chunk in gathered.chunks(n) {
                for (s, c) in recv.iter_mut().zip(chunk) {
                    *s += c;
                }
            }
        }
        self.bcast_into(0, recv);
    }

    fn allgather_into(&self, send: &[f64], recv: &mut [f64]) {
        let n = send.len();
        let rank = self.rank();
        assert_eq!(recv.len(), n * self.size() as usize);
        recv[(rank as usize) * n..(rank as usize + 1) * n].copy_from_slice(send);
        for r in 0..self.size() {
            if r != rank {
                self.send(r, TAG_COLLECTIVE, send);
            }
        }
        for r in 0..self.size() {
            if r != rank {
                self.recv_into(r, TAG_COLLECTIVE, &mut recv[(r as usize) * n..(r as usize + 1) * n]);
            }
        }
    }

    fn scatter_from_root_into(&self, root: i32, send: &[f64], recv: &mut [f64]) {
        let n = recv.len();
        if self.rank() == root {
            for r in 0..self.size() {
                let slice = &send[(r as usize) * n..(r as usize + 1) * n];
                if r == root {
                    recv.copy_from_slice(slice);
                } else {
                    self.send(r, TAG_COLLECTIVE, slice);
                }
            }
        } else {
            self.recv_into(root, TAG_COLLECTIVE, recv);
        }
    }

    fn gather_to_root_into(&self, root: i32, send: &[f64], recv: &mut [f64]) {
        let n = send.len();
        if self.rank() == root {
            for r in 0..self.size() {
                let slot = &mut recv[(r as usize) * n..(r as usize + 1) * n];
                if r == root {
                    slot.copy_from_slice(send);
                } else {
                    self.recv_into(r, TAG_COLLECTIVE, slot);
                }
            }
        } else {
            self.send(root, TAG_COLLECTIVE, send);
        }
    }

    fn bcast_into(&self, root: i32, buf: &mut [f64]) {
        if self.rank() == root {
            for r in 0..self.size() {
                if r != root {
                    self.send(r, TAG_COLLECTIVE, buf);
                }
            }
        } else {
            self.recv_into(root, TAG_COLLECTIVE, buf);
        }
    }

    fn split(&self, color: i32) -> Box<dyn Comm>;
}

const TAG_COLLECTIVE: i32 = -1;
