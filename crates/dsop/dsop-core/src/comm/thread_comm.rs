//! In-process, multi-threaded stand-in for `Comm`, used only by the test
//! suite. Ranks are OS threads sharing one `Network`; messages are queued
//! per `(src, dest, tag)` so there is no rendezvous deadlock to worry about
//! the way there can be with real eager/rendezvous MPI protocols.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::{Comm, PendingRecv, PendingSend};

struct Network {
    size: i32,
    inbox: Mutex<HashMap<(i32, i32, i32), std::collections::VecDeque<Vec<f64>>>>,
    cv: Condvar,
    barrier: Barrier,
    epoch: Instant,
    split_counter: AtomicU64,
    split_colors: Mutex<HashMap<i32, i32>>,
    split_registry: Mutex<HashMap<(u64, i32), Arc<Network>>>,
    /// Published by rank 0 once per `split()` round so every rank's
    /// independent call uses the *same* round index — see `split()`.
    split_call_index: Mutex<Option<u64>>,
}

impl Network {
    fn new(size: i32) -> Arc<Network> {
        Arc::new(Network {
            size,
            inbox: Mutex::new(HashMap::new()),
            cv: Condvar::new(),
            barrier: Barrier::new(size as usize),
            epoch: Instant::now(),
            split_counter: AtomicU64::new(0),
            split_colors: Mutex::new(HashMap::new()),
            split_registry: Mutex::new(HashMap::new()),
            split_call_index: Mutex::new(None),
        })
    }

    fn send(&self, src: i32, dest: i32, tag: i32, buf: Vec<f64>) {
        let mut inbox = self.inbox.lock().unwrap();
        inbox.entry((src, dest, tag)).or_default().push_back(buf);
        self.cv.notify_all();
    }

    fn recv_into(&self, src: i32, dest: i32, tag: i32, buf: &mut [f64]) {
        let mut inbox = self.inbox.lock().unwrap();
        loop {
            if let Some(q) = inbox.get_mut(&(src, dest, tag)) {
                if let Some(msg) = q.pop_front() {
                    assert_eq!(msg.len(), buf.len(), "message length mismatch on tag {tag}");
                    buf.copy_from_slice(&msg);
                    return;
                }
            }
            inbox = self.cv.wait(inbox).unwrap();
        }
    }
}

pub struct ThreadComm {
    net: Arc<Network>,
    rank: i32,
}

impl ThreadComm {
    /// Builds `size` `ThreadComm`s sharing one network, ranks 0..size.
    /// Meant to be handed one-per-thread by the caller (tests spawn one
    /// OS thread per rank and run a schedule's `compute` in each).
    pub fn new_group(size: i32) -> Vec<ThreadComm> {
        let net = Network::new(size);
        (0..size).map(|rank| ThreadComm { net: Arc::clone(&net), rank }).collect()
    }
}

struct ThreadPendingSend;

impl PendingSend for ThreadPendingSend {
    fn wait(self: Box<Self>) {}
}

struct ThreadPendingRecv {
    result: Arc<(Mutex<Option<Vec<f64>>>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl PendingRecv for ThreadPendingRecv {
    fn is_ready(&self) -> bool {
        self.result.0.lock().unwrap().is_some()
    }

    fn wait(mut self: Box<Self>) -> Vec<f64> {
        let (lock, cv) = &*self.result;
        let mut guard = lock.lock().unwrap();
        while guard.is_none() {
            guard = cv.wait(guard).unwrap();
        }
        let payload = guard.take().unwrap();
        drop(guard);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        payload
    }
}

impl Drop for ThreadPendingRecv {
    fn drop(&mut self) {
        if self.handle.is_some() {
            panic!("PendingRecv dropped without a matching wait()");
        }
    }
}

impl Comm for ThreadComm {
    fn rank(&self) -> i32 {
        self.rank
    }

    fn size(&self) -> i32 {
        self.net.size
    }

    fn wtime(&self) -> f64 {
        self.net.epoch.elapsed().as_secs_f64()
    }

    fn barrier(&self) {
        self.net.barrier.wait();
    }

    fn send(&self, dest: i32, tag: i32, buf: &[f64]) {
        self.net.send(self.rank, dest, tag, buf.to_vec());
    }

    fn recv_into(&self, src: i32, tag: i32, buf: &mut [f64]) {
        self.net.recv_into(src, self.rank, tag, buf);
    }

    fn isend(&self, dest: i32, tag: i32, buf: Vec<f64>) -> Box<dyn PendingSend> {
        self.net.send(self.rank, dest, tag, buf);
        Box::new(ThreadPendingSend)
    }

    fn irecv(&self, src: i32, tag: i32, len: usize) -> Box<dyn PendingRecv> {
        let net = Arc::clone(&self.net);
        let rank = self.rank;
        let result = Arc::new((Mutex::new(None), Condvar::new()));
        let result2 = Arc::clone(&result);
        let handle = thread::spawn(move || {
            let mut buf = vec![0.0; len];
            net.recv_into(src, rank, tag, &mut buf);
            let (lock, cv) = &*result2;
            *lock.lock().unwrap() = Some(buf);
            cv.notify_all();
        });
        Box::new(ThreadPendingRecv { result, handle: Some(handle) })
    }

    fn split(&self, color: i32) -> Box<dyn Comm> {
        // `call_index` must be the *same* value for every rank in this
        // round of `split()`, not read independently per rank — an atomic
        // `fetch_add` never returns the same value twice, so two co-members
        // of one color group would otherwise land on different keys and
        // each build their own private sub-network, deadlocking the first
        // time they try to talk to each other. Rank 0 alone takes the
        // counter and publishes it through `split_call_index`; every other
        // rank reads it back only after the barrier below guarantees it has
        // been written.
        self.net.split_colors.lock().unwrap().insert(self.rank, color);
        self.net.barrier.wait();

        if self.rank == 0 {
            let call_index = self.net.split_counter.fetch_add(1, Ordering::SeqCst);
            *self.net.split_call_index.lock().unwrap() = Some(call_index);
        }
        self.net.barrier.wait();
        let call_index = self
            .net
            .split_call_index
            .lock()
            .unwrap()
            .expect("rank 0 publishes the call index before this barrier releases");

        let members: Vec<i32> = {
            let colors = self.net.split_colors.lock().unwrap();
            let mut members: Vec<i32> =
                colors.iter().filter(|&(_, &c)| c == color).map(|(&r, _)| r).collect();
            members.sort_unstable();
            members
        };
        let new_rank = members.iter().position(|&r| r == self.rank).expect("rank in its own color group") as i32;
        let new_size = members.len() as i32;

        let key = (call_index, color);
        let sub_net = {
            let mut registry = self.net.split_registry.lock().unwrap();
            Arc::clone(registry.entry(key).or_insert_with(|| Network::new(new_size)))
        };
        self.net.barrier.wait();

        self.net.split_colors.lock().unwrap().remove(&self.rank);
        self.net.barrier.wait();
        if self.rank == members[0] {
            self.net.split_registry.lock().unwrap().remove(&key);
        }
        if self.rank == 0 {
            *self.net.split_call_index.lock().unwrap() = None;
        }

        Box::new(ThreadComm { net: sub_net, rank: new_rank })
    }
}
