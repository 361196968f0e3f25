use clap::Parser;

/// Command-line surface of the `dsop-bench` binary, one instance parsed per
/// process. Every rank receives the same argv (the process launcher is
/// responsible for that, same as any other MPI program) and so ends up with
/// an identical `Cli`.
#[derive(Debug, Parser)]
#[command(name = "dsop-bench", about = "Run a distributed sum-of-outer-products schedule")]
pub struct Cli {
    /// Size of each rank's A vector.
    #[arg(short = 'n', value_name = "N")]
    pub n: usize,

    /// Size of each rank's B vector.
    #[arg(short = 'm', value_name = "M")]
    pub m: usize,

    /// Schedule name — see `dsop_schedules::registry_names()`.
    #[arg(short = 'i', value_name = "NAME")]
    pub name: String,

    /// Iteration count.
    #[arg(short = 't', value_name = "ITERS", default_value_t = 1)]
    pub iterations: u32,

    /// Enable oracle validation.
    #[arg(short = 'c')]
    pub validate: bool,

    /// Print input vectors and the final result.
    #[arg(short = 'v')]
    pub verbose: bool,
}
