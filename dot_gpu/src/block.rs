/// The view a single thread has of the block it runs in.
///
/// Kernels are written against this trait so that the same code runs on the
/// device, where it maps onto `cuda_std::thread` and a shared array, and on the
/// host simulator, where every thread of a block is an OS thread.
pub trait Block {
    /// Index of the calling thread within its block.
    fn thread_idx(&self) -> usize;

    /// Index of the block within the grid.
    fn block_idx(&self) -> usize;

    /// Number of threads in every block of the grid.
    fn block_dim(&self) -> usize;

    /// Waits until every thread of the block has reached this point. Writes to
    /// the scratch buffer made before the barrier are visible to every thread
    /// after it.
    fn sync_threads(&self);

    /// Reads slot `i` of the block's shared scratch buffer.
    fn scratch_load(&self, i: usize) -> i32;

    /// Writes slot `i` of the block's shared scratch buffer.
    fn scratch_store(&self, i: usize, value: i32);

    /// Linear index of the calling thread within the whole grid.
    fn global_idx(&self) -> usize {
        self.block_idx() * self.block_dim() + self.thread_idx()
    }
}
