//! Device memory, transfers and kernel launches.
//!
//! The pipeline in [`crate::dot`] only talks to a [`Device`]. The simulator is
//! always available; the CUDA backend needs the `cuda` feature.

#[cfg(feature = "cuda")]
pub mod cuda;
pub mod sim;

use crate::launch::{DeviceLimits, LaunchConfig};
use dot_gpu::Reduction;
use std::fmt;

/// Allocation, transfer and launch primitives of a compute device.
///
/// Launches are asynchronous: [`Device::launch`] only queues the kernel.
/// Errors caused by the launch itself or by the running kernel may not show
/// up until [`Device::synchronize`] or a blocking copy.
pub trait Device {
    /// Device-resident array of `i32`.
    type Buffer;

    /// Raw status returned by the backend when a call fails.
    type Error: fmt::Display;

    fn name(&self) -> &str;

    fn limits(&self) -> DeviceLimits;

    /// Allocates a device buffer of `len` elements. Its contents are
    /// unspecified until written.
    fn alloc(&self, len: usize) -> Result<Self::Buffer, Self::Error>;

    /// Allocates a device buffer of `len` zeroes.
    fn alloc_zeroed(&self, len: usize) -> Result<Self::Buffer, Self::Error>;

    /// Copies `host` into `buffer`, waiting for queued work first. The lengths
    /// must match.
    fn copy_from_host(&self, buffer: &mut Self::Buffer, host: &[i32]) -> Result<(), Self::Error>;

    /// Queues the dot product kernel for the first `n` elements of `a` and `b`,
    /// writing the sum into element 0 of `res`.
    fn launch(
        &self,
        reduction: Reduction,
        config: LaunchConfig,
        n: usize,
        a: &Self::Buffer,
        b: &Self::Buffer,
        res: &Self::Buffer,
    ) -> Result<(), Self::Error>;

    /// Blocks until all queued work has finished.
    fn synchronize(&self) -> Result<(), Self::Error>;

    /// Copies `buffer` into `host`, waiting for queued work first. The lengths
    /// must match.
    fn copy_to_host(&self, buffer: &Self::Buffer, host: &mut [i32]) -> Result<(), Self::Error>;
}
