use dot_gpu::MAX_THREADS_PER_BLOCK;
use thiserror::Error;

/// Largest grid the simulator accepts by default, matching the y/z grid limit
/// of CUDA devices.
pub const DEFAULT_MAX_BLOCKS_PER_GRID: usize = 65_535;

/// Hardware limits a launch must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_threads_per_block: usize,
    pub max_blocks_per_grid: usize,
}

impl DeviceLimits {
    /// Limits reported by a device, capped to what the kernels support. The
    /// kernels' shared scratch has room for `MAX_THREADS_PER_BLOCK` threads, so
    /// a larger hardware block would write past it.
    pub fn from_device(max_threads_per_block: usize, max_blocks_per_grid: usize) -> Self {
        Self {
            max_threads_per_block: max_threads_per_block.min(MAX_THREADS_PER_BLOCK),
            max_blocks_per_grid,
        }
    }
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_threads_per_block: MAX_THREADS_PER_BLOCK,
            max_blocks_per_grid: DEFAULT_MAX_BLOCKS_PER_GRID,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    #[error("a block needs at least one thread")]
    ZeroThreads,

    #[error("a grid needs at least one block")]
    ZeroBlocks,

    #[error("{requested} threads per block exceeds the device limit of {max}")]
    ThreadsExceedDeviceLimit { requested: usize, max: usize },

    #[error("{requested} blocks per grid exceeds the device limit of {max}")]
    BlocksExceedDeviceLimit { requested: usize, max: usize },

    /// The reduction sums a single block, so every index has to land in it.
    #[error("{len} elements do not fit in one block of {threads_per_block} threads")]
    ExceedsSingleBlock { len: usize, threads_per_block: usize },
}

/// The `<<<blocks, threads>>>` pair of a kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub blocks_per_grid: usize,
    pub threads_per_block: usize,
}

impl LaunchConfig {
    pub fn new(blocks_per_grid: usize, threads_per_block: usize) -> Self {
        Self {
            blocks_per_grid,
            threads_per_block,
        }
    }

    /// One block with exactly one thread per element. An empty input still
    /// gets one thread so the result cell is written.
    pub fn single_block(len: usize) -> Self {
        Self::new(1, len.max(1))
    }

    pub fn total_threads(&self) -> usize {
        self.blocks_per_grid * self.threads_per_block
    }

    /// Checks that the launch fits the device and that all `len` indices fall
    /// inside the first block.
    pub fn validate(&self, len: usize, limits: &DeviceLimits) -> Result<(), LaunchError> {
        self.check_limits(limits)?;
        if len > self.threads_per_block {
            return Err(LaunchError::ExceedsSingleBlock {
                len,
                threads_per_block: self.threads_per_block,
            });
        }
        Ok(())
    }

    /// The part of `validate` that does not depend on the input, which is all a
    /// device can check when the kernel is launched.
    pub fn check_limits(&self, limits: &DeviceLimits) -> Result<(), LaunchError> {
        if self.threads_per_block == 0 {
            return Err(LaunchError::ZeroThreads);
        }
        if self.blocks_per_grid == 0 {
            return Err(LaunchError::ZeroBlocks);
        }
        if self.threads_per_block > limits.max_threads_per_block {
            return Err(LaunchError::ThreadsExceedDeviceLimit {
                requested: self.threads_per_block,
                max: limits.max_threads_per_block,
            });
        }
        if self.blocks_per_grid > limits.max_blocks_per_grid {
            return Err(LaunchError::BlocksExceedDeviceLimit {
                requested: self.blocks_per_grid,
                max: limits.max_blocks_per_grid,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DeviceLimits, LaunchConfig, LaunchError};

    #[test]
    fn single_block_test() {
        assert_eq!(LaunchConfig::single_block(1024), LaunchConfig::new(1, 1024));
        assert_eq!(LaunchConfig::single_block(0), LaunchConfig::new(1, 1));
        assert_eq!(LaunchConfig::new(4, 256).total_threads(), 1024);
    }

    #[test]
    fn accepts_max_block() {
        let limits = DeviceLimits::default();
        assert_eq!(LaunchConfig::new(1, 1024).validate(1024, &limits), Ok(()));
        assert_eq!(LaunchConfig::new(1, 1).validate(1, &limits), Ok(()));
        // Extra blocks are idle but legal.
        assert_eq!(LaunchConfig::new(3, 8).validate(5, &limits), Ok(()));
    }

    #[test]
    fn rejects_oversized_block_instead_of_truncating() {
        let limits = DeviceLimits::default();
        assert_eq!(
            LaunchConfig::new(1, 2048).validate(1024, &limits),
            Err(LaunchError::ThreadsExceedDeviceLimit {
                requested: 2048,
                max: 1024
            })
        );
    }

    #[test]
    fn rejects_input_spanning_blocks() {
        let limits = DeviceLimits::default();
        assert_eq!(
            LaunchConfig::new(2, 1024).validate(1025, &limits),
            Err(LaunchError::ExceedsSingleBlock {
                len: 1025,
                threads_per_block: 1024
            })
        );
    }

    #[test]
    fn rejects_empty_launches() {
        let limits = DeviceLimits::default();
        assert_eq!(LaunchConfig::new(1, 0).validate(0, &limits), Err(LaunchError::ZeroThreads));
        assert_eq!(LaunchConfig::new(0, 1).validate(0, &limits), Err(LaunchError::ZeroBlocks));
    }

    #[test]
    fn rejects_oversized_grid() {
        let limits = DeviceLimits {
            max_threads_per_block: 1024,
            max_blocks_per_grid: 4,
        };
        assert_eq!(
            LaunchConfig::new(5, 32).check_limits(&limits),
            Err(LaunchError::BlocksExceedDeviceLimit {
                requested: 5,
                max: 4
            })
        );
    }

    #[test]
    fn device_limits_are_capped_to_kernel_scratch() {
        let limits = DeviceLimits::from_device(2048, 100);
        assert_eq!(limits.max_threads_per_block, 1024);
        assert_eq!(limits.max_blocks_per_grid, 100);
        assert_eq!(DeviceLimits::from_device(512, 1).max_threads_per_block, 512);
        assert!(matches!(
            LaunchConfig::new(1, 2048).check_limits(&limits),
            Err(LaunchError::ThreadsExceedDeviceLimit {
                requested: 2048,
                max: 1024
            })
        ));
    }
}
