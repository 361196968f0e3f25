//! One MPI tag constant per communication class. Reuse within a class is
//! fine since `(sender, receiver, tag)` is FIFO on every backend; distinct
//! classes get distinct tags so two schedules' messages (or two phases of
//! the same schedule) can never be mistaken for one another.

pub const VALIDATE: i32 = 1;
pub const ALLGATHER_ASYNC: i32 = 2;
pub const ALLREDUCE_BUTTERFLY: i32 = 3;
pub const ALLREDUCE_BUTTERFLY_REDUCE: i32 = 4;
pub const ALLREDUCE_BUTTERFLY_SEGMENTED: i32 = 5;
pub const ALLREDUCE_BUTTERFLY_SEGMENTED_REDUCE: i32 = 6;
pub const ALLREDUCE_RABENSEIFNER: i32 = 7;
pub const ALLREDUCE_RING: i32 = 8;
pub const ALLREDUCE_RING_PIPELINE: i32 = 9;
pub const RABENSEIFNER_GATHER: i32 = 10;
pub const RABENSEIFNER_GATHER_VEC_A: i32 = 11;
pub const RABENSEIFNER_GATHER_VEC_B: i32 = 12;
pub const BRUCK_ASYNC: i32 = 13;
pub const RABENSEIFNER_SCATTER: i32 = 14;
pub const GRABENSEIFNER_ALLGATHER_SEGMENTED: i32 = 15;

// The rest of the `grabenseifner_*` family only uses `Comm`'s collective
// helpers (all-gather/scatter/gather/split/broadcast), which tag internally
// with `TAG_COLLECTIVE` already, so it needs no tag constant of its own
// here. `grabenseifner_allgather_segmented` is the exception: it pipelines
// B's transfer with point-to-point `isend`/`irecv` instead, like
// `allgather_async`, so it needs a tag of its own.
