//! Monotonic timing for the harness and for charging transport calls to a
//! per-schedule `mpi_time` accumulator.
//!
//! `std::time::Instant` is already a monotonic clock on every platform this
//! crate targets, so there is no hand-rolled `mach_absolute_time`/
//! `clock_gettime` platform branch to maintain here.

use std::time::Instant;

/// Microseconds elapsed since an arbitrary process-wide epoch, captured the
/// first time this function runs.
pub fn now_us() -> i64 {
    static EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_micros() as i64
}

/// A single scoped measurement: `start()` then `finish()` for the elapsed
/// microseconds. Used by the harness for total per-iteration wall time,
/// separately from the transport-only `MpiTimer` below.
pub struct ScopedTimer {
    started_us: i64,
}

impl ScopedTimer {
    pub fn start() -> Self {
        Self { started_us: now_us() }
    }

    pub fn finish(self) -> i64 {
        now_us() - self.started_us
    }
}

/// Accumulates microseconds spent inside transport calls. A schedule is
/// handed a fresh one per `compute` call and wraps every `Comm` call it
/// makes in `time(...)`; the harness reads `total_us()` back afterwards.
///
/// A closure already captures whatever arguments a transport call needs,
/// so there is nothing to forward explicitly beyond the closure itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct MpiTimer {
    total_us: i64,
}

impl MpiTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f`, charges its wall-clock duration to this accumulator, and
    /// returns `f`'s result. Non-transport work should never be passed here.
    pub fn time<R>(&mut self, f: impl FnOnce() -> R) -> R {
        let start = now_us();
        let result = f();
        self.total_us += now_us() - start;
        result
    }

    pub fn total_us(&self) -> i64 {
        self.total_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn scoped_timer_reports_nonnegative_elapsed() {
        let t = ScopedTimer::start();
        sleep(Duration::from_millis(1));
        assert!(t.finish() > 0);
    }

    #[test]
    fn mpi_timer_accumulates_across_calls() {
        let mut timer = MpiTimer::new();
        timer.time(|| sleep(Duration::from_millis(1)));
        timer.time(|| sleep(Duration::from_millis(1)));
        assert!(timer.total_us() >= 2000);
    }

    #[test]
    fn mpi_timer_forwards_closure_result() {
        let mut timer = MpiTimer::new();
        let value = timer.time(|| 42);
        assert_eq!(value, 42);
    }
}
