//! Core data types and transport facade shared by every schedule: the dense
//! `Matrix`/`Vector` primitives, the `ProcessContext` a schedule is handed
//! alongside a communicator, the `Comm` transport trait and its two
//! backends, the seeded vector generator, and the crate-wide error type.

pub mod comm;
pub mod context;
pub mod error;
pub mod matrix;
pub mod vector;

pub use comm::{Comm, MpiComm, PendingRecv, PendingSend, ThreadComm};
pub use context::ProcessContext;
pub use error::DsopError;
pub use matrix::Matrix;
pub use vector::{Vector, generate_vector, seed_for_rank};
