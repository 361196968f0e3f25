use clap::Parser;
use dsop_core::{Comm, MpiComm};
use dsop_harness::{Cli, RunConfig};
use mpi::Threading;
use tracing::{error, info, info_span};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("INFO")))
        .init();

    // `Threading::Multiple` is required: `MpiComm::isend`/`irecv` hand owned
    // buffers to a helper OS thread that performs the actual blocking `mpi`
    // call (see `dsop_core::comm::mpi_comm`), so this process's `mpi` calls
    // are no longer confined to the thread that called `MPI_Init`.
    let (universe, _threading) =
        mpi::initialize_with_threading(Threading::Multiple).expect("MPI_Init_thread failed");
    let comm = MpiComm::world(universe.world());

    let _span = info_span!("dsop-bench", rank = comm.rank()).entered();
    info!(n = cli.n, m = cli.m, schedule = %cli.name, iterations = cli.iterations, "starting run");

    let config = RunConfig {
        n: cli.n,
        m: cli.m,
        schedule_name: cli.name,
        iterations: cli.iterations,
        validate: cli.validate,
        verbose: cli.verbose,
    };

    if let Err(err) = dsop_harness::run(&comm, &config) {
        error!(%err, "run failed");
        std::process::exit(1);
    }
}
