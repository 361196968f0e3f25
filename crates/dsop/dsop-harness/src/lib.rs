//! CLI parsing, the per-iteration driver, and JSON result reporting shared
//! by the `dsop-bench` binary. Kept separate from `bins/dsop-bench` so the
//! driver can be exercised in tests against `dsop_core::ThreadComm` without
//! an `mpiexec` launcher.

mod cli;
mod driver;
mod report;

pub use cli::Cli;
pub use driver::{RunConfig, run};
pub use report::IterationRecord;
