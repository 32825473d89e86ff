use clap::{Parser, ValueEnum};
use dot_cuda::{run, Backend, LaunchConfig, Reduction, RunConfig};
use std::error::Error;
use tracing_subscriber::EnvFilter;

/// Dot product of two uniformly filled vectors on a GPU or the simulator.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Length of both vectors.
    #[arg(long, default_value_t = 1024)]
    len: usize,

    /// Value of every element of the first vector.
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    fill_a: i32,

    /// Value of every element of the second vector.
    #[arg(long, default_value_t = 2, allow_negative_numbers = true)]
    fill_b: i32,

    /// Threads per block. Defaults to one thread per element.
    #[arg(long)]
    threads_per_block: Option<usize>,

    /// Blocks per grid.
    #[arg(long, default_value_t = 1)]
    blocks: usize,

    #[arg(long, value_enum, default_value_t = ReductionArg::Serial)]
    reduction: ReductionArg,

    #[arg(long, value_enum, default_value_t = BackendArg::Sim)]
    backend: BackendArg,

    /// Memory capacity of the simulated device.
    #[arg(long, default_value_t = dot_cuda::device::sim::DEFAULT_MEMORY_CAPACITY)]
    sim_memory_bytes: usize,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ReductionArg {
    Serial,
    Tree,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendArg {
    Sim,
    #[cfg(feature = "cuda")]
    Cuda,
}

impl From<&Args> for RunConfig {
    fn from(args: &Args) -> Self {
        let threads_per_block = args.threads_per_block.unwrap_or(args.len.max(1));
        RunConfig {
            len: args.len,
            fill_a: args.fill_a,
            fill_b: args.fill_b,
            launch: LaunchConfig::new(args.blocks, threads_per_block),
            reduction: match args.reduction {
                ReductionArg::Serial => Reduction::Serial,
                ReductionArg::Tree => Reduction::Tree,
            },
            backend: match args.backend {
                BackendArg::Sim => Backend::Sim,
                #[cfg(feature = "cuda")]
                BackendArg::Cuda => Backend::Cuda,
            },
            sim_memory_bytes: args.sim_memory_bytes,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = RunConfig::from(&args);

    let result = run(&config)?;
    let expected = dot_cuda::uniform_expected(config.len, config.fill_a, config.fill_b);
    println!("Does device value {} = {}? Yes.", result, expected);

    Ok(())
}
