//! Shared `PendingSend`/`PendingRecv` implementation backed by a plain OS
//! thread running a blocking call. Used by both `ThreadComm` (where the
//! blocking call is a queue push/pop) and `MpiComm` (where it is a real
//! blocking `mpi` send/receive) so neither backend has to fight rsmpi's
//! request-scope lifetime machinery to get overlap between communication
//! and computation — the overlap comes from the OS thread instead.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use super::{PendingRecv, PendingSend};

pub(crate) struct ThreadedSend {
    handle: Option<JoinHandle<()>>,
}

impl ThreadedSend {
    pub(crate) fn spawn(f: impl FnOnce() + Send + 'static) -> Self {
        Self { handle: Some(thread::spawn(f)) }
    }
}

impl PendingSend for ThreadedSend {
    fn wait(mut self: Box<Self>) {
        if let Some(handle) = self.handle.take() {
            handle.join().expect("send thread panicked");
        }
    }
}

impl Drop for ThreadedSend {
    fn drop(&mut self) {
        if self.handle.is_some() {
            panic!("PendingSend dropped without a matching wait()");
        }
    }
}

pub(crate) struct ThreadedRecv {
    result: Arc<(Mutex<Option<Vec<f64>>>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadedRecv {
    pub(crate) fn spawn(f: impl FnOnce() -> Vec<f64> + Send + 'static) -> Self {
        let result = Arc::new((Mutex::new(None), Condvar::new()));
        let result2 = Arc::clone(&result);
        let handle = thread::spawn(move || {
            let payload = f();
            let (lock, cv) = &*result2;
            *lock.lock().unwrap() = Some(payload);
            cv.notify_all();
        });
        Self { result, handle: Some(handle) }
    }
}

impl PendingRecv for ThreadedRecv {
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

impl Drop for ThreadedRecv {
    fn drop(&mut self) {
        if self.handle.is_some() {
            panic!("PendingRecv dropped without a matching wait()");
        }
    }
}
