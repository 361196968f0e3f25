/// Immutable per-call context handed to a schedule alongside a `Comm`.
///
/// The communicator is deliberately not stored here: `grabenseifner_subgroup`
/// hands a schedule a split sub-communicator for part of its work while
/// still wanting the original `n`/`m`, so the two travel separately.
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext {
    pub rank: i32,
    pub num_procs: i32,
    pub n: usize,
    pub m: usize,
}

impl ProcessContext {
    pub fn new(rank: i32, num_procs: i32, n: usize, m: usize) -> Self {
        debug_assert!(num_procs >= 1, "a process group can never report size 0");
        debug_assert!(rank >= 0 && rank < num_procs, "rank out of range");
        Self { rank, num_procs, n, m }
    }

    pub fn is_root(&self) -> bool {
        self.rank == 0
    }

    /// Largest power of two <= num_procs, and the excess above it.
    pub fn power_of_two_split(&self) -> (i32, i32) {
        let p2 = 1i32 << (31 - self.num_procs.leading_zeros());
        (p2, self.num_procs - p2)
    }

    pub fn is_power_of_two(&self) -> bool {
        self.num_procs.count_ones() == 1
    }
}
