use crate::{block::Block, step::div_step};

/// How the per-thread products of a block are summed once they are in shared
/// scratch memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reduction {
    /// Thread 0 scans the whole scratch buffer on its own. O(n) critical path.
    Serial,
    /// Pairwise halving with a barrier between steps. O(log n) critical path.
    Tree,
}

/// Computes the dot product of `a` and `b` over the first `n` elements.
///
/// Every thread of the grid must call this. The thread with global index 0
/// gets `Some(sum)` and is responsible for writing it to the result cell; every
/// other thread gets `None`.
///
/// All `n` indices must fall inside the first block, that is
/// `n <= block_dim`, and the scratch buffer must hold at least `block_dim`
/// elements. Threads whose index is at or past `n` still take part in every
/// barrier.
pub fn dot_block<B>(block: &B, reduction: Reduction, n: usize, a: &[i32], b: &[i32]) -> Option<i32>
where
    B: Block,
{
    match reduction {
        Reduction::Serial => serial_dot(block, n, a, b),
        Reduction::Tree => tree_dot(block, n, a, b),
    }
}

fn serial_dot<B: Block>(block: &B, n: usize, a: &[i32], b: &[i32]) -> Option<i32> {
    let t_idx = block.thread_idx();
    let id = block.global_idx();

    if id < n {
        block.scratch_store(t_idx, a[id].wrapping_mul(b[id]));
    }

    block.sync_threads();

    if id == 0 {
        let mut sum = 0i32;
        for i in 0..n.min(block.block_dim()) {
            sum = sum.wrapping_add(block.scratch_load(i));
        }
        Some(sum)
    } else {
        None
    }
}

fn tree_dot<B: Block>(block: &B, n: usize, a: &[i32], b: &[i32]) -> Option<i32> {
    let t_idx = block.thread_idx();
    let id = block.global_idx();
    let b_dim = block.block_dim();

    // Idle threads contribute the additive identity so the halving below never
    // needs to know about n.
    let product = if id < n { a[id].wrapping_mul(b[id]) } else { 0 };
    block.scratch_store(t_idx, product);

    block.sync_threads();

    // Starting from the power of two at or above the block size keeps every
    // element in play when the block size is not itself a power of two.
    for stride in div_step(b_dim.next_power_of_two() / 2, 2) {
        if t_idx < stride && t_idx + stride < b_dim {
            let sum = block
                .scratch_load(t_idx)
                .wrapping_add(block.scratch_load(t_idx + stride));
            block.scratch_store(t_idx, sum);
        }
        block.sync_threads();
    }

    if id == 0 {
        Some(block.scratch_load(0))
    } else {
        None
    }
}
