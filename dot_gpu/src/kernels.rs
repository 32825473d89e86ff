use crate::{
    block::Block,
    reduce::{dot_block, Reduction},
    MAX_THREADS_PER_BLOCK,
};
use cuda_std::{kernel, shared_array, thread};

/// A device thread's view of its block. The scratch pointer comes from a
/// `shared_array!` declared in the kernel, so it is shared by the whole block.
struct DeviceBlock {
    scratch: *mut i32,
}

impl Block for DeviceBlock {
    fn thread_idx(&self) -> usize {
        thread::thread_idx_x() as usize
    }

    fn block_idx(&self) -> usize {
        thread::block_idx_x() as usize
    }

    fn block_dim(&self) -> usize {
        thread::block_dim_x() as usize
    }

    fn sync_threads(&self) {
        thread::sync_threads();
    }

    fn scratch_load(&self, i: usize) -> i32 {
        unsafe { *self.scratch.add(i) }
    }

    fn scratch_store(&self, i: usize, value: i32) {
        unsafe {
            *(&mut *self.scratch.add(i)) = value;
        }
    }
}

/// Dot product of the first `n` elements of `a` and `b` into `*res`, summed by
/// thread 0 alone. The launch must use a single block of at least `n` threads
/// and at most `MAX_THREADS_PER_BLOCK`.
#[kernel]
#[allow(improper_ctypes_definitions, clippy::missing_safety_doc)]
pub unsafe fn dot_serial(n: usize, a: &[i32], b: &[i32], res: *mut i32) {
    let block = DeviceBlock {
        scratch: shared_array![i32; MAX_THREADS_PER_BLOCK],
    };
    if let Some(sum) = dot_block(&block, Reduction::Serial, n, a, b) {
        *(&mut *res) = sum;
    }
}

/// Same contract as `dot_serial`, summed with a halving tree.
#[kernel]
#[allow(improper_ctypes_definitions, clippy::missing_safety_doc)]
pub unsafe fn dot_tree(n: usize, a: &[i32], b: &[i32], res: *mut i32) {
    let block = DeviceBlock {
        scratch: shared_array![i32; MAX_THREADS_PER_BLOCK],
    };
    if let Some(sum) = dot_block(&block, Reduction::Tree, n, a, b) {
        *(&mut *res) = sum;
    }
}
