#![cfg_attr(
    target_os = "cuda",
    no_std,
    feature(register_attr),
    register_attr(nvvm_internal)
)]

pub mod block;
#[cfg(target_os = "cuda")]
pub mod kernels;
pub mod reduce;
mod step;

pub use block::Block;
pub use reduce::{dot_block, Reduction};

/// The largest block the kernels support. The shared scratch array of the
/// device kernels is sized to this many elements.
pub const MAX_THREADS_PER_BLOCK: usize = 1024;
