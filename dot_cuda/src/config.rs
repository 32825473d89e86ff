use crate::{
    device::{sim::SimDevice, Device},
    dot::{dot_product, uniform_expected, verify},
    error::DotError,
    launch::LaunchConfig,
};
use dot_gpu::{Reduction, MAX_THREADS_PER_BLOCK};
use itertools::{repeat_n, Itertools};

/// Where the kernel runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sim,
    #[cfg(feature = "cuda")]
    Cuda,
}

/// One run of the program: two uniformly filled vectors, a launch
/// configuration and a device to run on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub len: usize,
    pub fill_a: i32,
    pub fill_b: i32,
    pub launch: LaunchConfig,
    pub reduction: Reduction,
    pub backend: Backend,
    /// Capacity of the simulated device. Ignored by other backends.
    pub sim_memory_bytes: usize,
}

impl Default for RunConfig {
    /// 1024 ones dotted with 1024 twos in a single block of 1024 threads.
    fn default() -> Self {
        Self {
            len: MAX_THREADS_PER_BLOCK,
            fill_a: 1,
            fill_b: 2,
            launch: LaunchConfig::single_block(MAX_THREADS_PER_BLOCK),
            reduction: Reduction::Serial,
            backend: Backend::Sim,
            sim_memory_bytes: crate::device::sim::DEFAULT_MEMORY_CAPACITY,
        }
    }
}

/// Runs `config` on its backend and checks the result against the closed form
/// `len * fill_a * fill_b`.
pub fn run(config: &RunConfig) -> Result<i32, DotError> {
    match config.backend {
        Backend::Sim => {
            let device = SimDevice::new().with_memory_capacity(config.sim_memory_bytes);
            run_on(&device, config)
        }
        #[cfg(feature = "cuda")]
        Backend::Cuda => {
            let device = crate::error::check(
                crate::error::Stage::Initialization,
                "initialize cuda device",
                crate::device::cuda::CudaDevice::new(),
            )?;
            run_on(&device, config)
        }
    }
}

/// Same as [`run`] on a device the caller already has.
pub fn run_on<D>(device: &D, config: &RunConfig) -> Result<i32, DotError>
where
    D: Device,
{
    // Reject lengths the launch cannot cover before building the inputs.
    config.launch.validate(config.len, &device.limits())?;

    let a = repeat_n(config.fill_a, config.len).collect_vec();
    let b = repeat_n(config.fill_b, config.len).collect_vec();

    tracing::info!(
        device = device.name(),
        len = config.len,
        fill_a = config.fill_a,
        fill_b = config.fill_b,
        "running dot product"
    );
    let actual = dot_product(device, &a, &b, config.launch, config.reduction)?;
    verify(uniform_expected(config.len, config.fill_a, config.fill_b), actual)?;
    Ok(actual)
}
