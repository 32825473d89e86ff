//! A CPU stand-in for a CUDA device.
//!
//! Kernels run the real `dot_gpu` code. Every device thread of a block is an
//! OS thread, the block's shared memory is an array of atomics and
//! `sync_threads` is a barrier, so missing barriers or out-of-range scratch
//! accesses misbehave here the same way they would on hardware. Blocks of a
//! grid run concurrently on the rayon pool in no particular order.
//!
//! Like a real device, launches are queued and their failures are reported by
//! the next [`SimDevice::synchronize`] or blocking copy.

use super::Device;
use crate::launch::{DeviceLimits, LaunchConfig, LaunchError};
use dot_gpu::{dot_block, Block, Reduction};
use rayon::prelude::*;
use std::{
    mem,
    panic,
    sync::{
        atomic::{AtomicI32, AtomicUsize, Ordering},
        Arc, Condvar, Mutex, PoisonError, RwLock, RwLockReadGuard,
    },
    thread::{self, JoinHandle},
};
use thiserror::Error;

/// Default amount of simulated device memory.
pub const DEFAULT_MEMORY_CAPACITY: usize = 256 * 1024 * 1024;

/// Stack size of the OS thread backing each device thread.
const THREAD_STACK_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("out of device memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },

    #[error("invalid launch configuration: {0}")]
    InvalidConfiguration(#[from] LaunchError),

    #[error("illegal address: kernel reads {required} elements of `{buffer}`, which holds {len}")]
    IllegalAddress {
        buffer: &'static str,
        len: usize,
        required: usize,
    },

    #[error("unspecified launch failure: thread {thread} of block {block} faulted")]
    KernelFault { block: usize, thread: usize },

    #[error("too many resources requested for launch: {0}")]
    OutOfResources(String),

    #[error("copy size mismatch: device buffer holds {device} elements, host buffer {host}")]
    SizeMismatch { device: usize, host: usize },

    #[error("device state poisoned by an earlier fault")]
    Poisoned,

    #[error("{0} copy failed")]
    TransferFault(&'static str),
}

/// A failure the simulator produces on purpose, once, to exercise the error
/// paths of its callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFault {
    /// The next host-to-device copy fails.
    CopyFromHost,
    /// The next device-to-host copy fails.
    CopyToHost,
    /// The next launch is refused before it is queued.
    Launch,
    /// In the next launch, the given thread dies before it reaches the kernel.
    ThreadPanic { block: usize, thread: usize },
}

/// Unwind payload of a thread killed by `InjectedFault::ThreadPanic`.
struct InjectedPanic;

/// A simulated device allocation.
///
/// The bytes count against the owning device's capacity until the buffer is
/// dropped.
#[derive(Debug)]
pub struct SimBuffer {
    cells: Arc<RwLock<Vec<i32>>>,
    bytes: usize,
    allocated: Arc<AtomicUsize>,
}

impl SimBuffer {
    pub fn len(&self) -> usize {
        self.bytes / mem::size_of::<i32>()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }
}

impl Drop for SimBuffer {
    fn drop(&mut self) {
        self.allocated.fetch_sub(self.bytes, Ordering::SeqCst);
    }
}

type PendingLaunch = JoinHandle<Result<(), SimError>>;

pub struct SimDevice {
    limits: DeviceLimits,
    capacity: usize,
    allocated: Arc<AtomicUsize>,
    queue: Mutex<Vec<PendingLaunch>>,
    launches: AtomicUsize,
    faults: Mutex<Vec<InjectedFault>>,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDevice {
    pub fn new() -> Self {
        Self {
            limits: DeviceLimits::default(),
            capacity: DEFAULT_MEMORY_CAPACITY,
            allocated: Arc::new(AtomicUsize::new(0)),
            queue: Mutex::new(Vec::new()),
            launches: AtomicUsize::new(0),
            faults: Mutex::new(Vec::new()),
        }
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_memory_capacity(mut self, bytes: usize) -> Self {
        self.capacity = bytes;
        self
    }

    /// Arms `fault`. Each armed fault fires once.
    pub fn with_fault(self, fault: InjectedFault) -> Self {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fault);
        self
    }

    /// Disarms and returns the first armed fault matching `pred`.
    fn take_fault(&self, pred: impl Fn(&InjectedFault) -> bool) -> Option<InjectedFault> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        let i = faults.iter().position(pred)?;
        let fault = faults.remove(i);
        tracing::debug!(?fault, "injecting fault");
        Some(fault)
    }

    /// Bytes currently held by live buffers.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    fn reserve(&self, len: usize) -> Result<usize, SimError> {
        let requested = len * mem::size_of::<i32>();
        let capacity = self.capacity;
        self.allocated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                used.checked_add(requested).filter(|&total| total <= capacity)
            })
            .map(|_| requested)
            .map_err(|used| SimError::OutOfMemory {
                requested,
                available: capacity.saturating_sub(used),
            })
    }

    fn new_buffer(&self, cells: Vec<i32>) -> Result<SimBuffer, SimError> {
        let bytes = self.reserve(cells.len())?;
        tracing::debug!(bytes, "sim alloc");
        Ok(SimBuffer {
            cells: Arc::new(RwLock::new(cells)),
            bytes,
            allocated: Arc::clone(&self.allocated),
        })
    }
}

impl Device for SimDevice {
    type Buffer = SimBuffer;
    type Error = SimError;

    fn name(&self) -> &str {
        "simulator"
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn alloc(&self, len: usize) -> Result<SimBuffer, SimError> {
        self.new_buffer(vec![0; len])
    }

    fn alloc_zeroed(&self, len: usize) -> Result<SimBuffer, SimError> {
        self.new_buffer(vec![0; len])
    }

    fn copy_from_host(&self, buffer: &mut SimBuffer, host: &[i32]) -> Result<(), SimError> {
        self.synchronize()?;
        if self
            .take_fault(|f| *f == InjectedFault::CopyFromHost)
            .is_some()
        {
            return Err(SimError::TransferFault("host to device"));
        }
        let mut cells = buffer.cells.write().map_err(|_| SimError::Poisoned)?;
        if cells.len() != host.len() {
            return Err(SimError::SizeMismatch {
                device: cells.len(),
                host: host.len(),
            });
        }
        cells.copy_from_slice(host);
        Ok(())
    }

    fn launch(
        &self,
        reduction: Reduction,
        config: LaunchConfig,
        n: usize,
        a: &SimBuffer,
        b: &SimBuffer,
        res: &SimBuffer,
    ) -> Result<(), SimError> {
        if self.take_fault(|f| *f == InjectedFault::Launch).is_some() {
            return Err(SimError::OutOfResources("launch refused".to_string()));
        }
        let panic_at = match self.take_fault(|f| matches!(f, InjectedFault::ThreadPanic { .. })) {
            Some(InjectedFault::ThreadPanic { block, thread }) => Some((block, thread)),
            _ => None,
        };
        let launch_id = self.launches.fetch_add(1, Ordering::SeqCst);
        let limits = self.limits;
        let (a, b, res) = (
            Arc::clone(&a.cells),
            Arc::clone(&b.cells),
            Arc::clone(&res.cells),
        );

        tracing::debug!(
            launch_id,
            ?reduction,
            blocks = config.blocks_per_grid,
            threads = config.threads_per_block,
            n,
            "sim launch queued"
        );
        let handle = thread::Builder::new()
            .name(format!("sim-grid-{launch_id}"))
            .spawn(move || {
                let _span = tracing::debug_span!("sim_grid", launch_id).entered();
                run_grid(reduction, config, &limits, n, panic_at, [&a, &b, &res])
            })
            .map_err(|err| SimError::OutOfResources(err.to_string()))?;

        self.queue
            .lock()
            .map_err(|_| SimError::Poisoned)?
            .push(handle);
        Ok(())
    }

    fn synchronize(&self) -> Result<(), SimError> {
        let pending = mem::take(&mut *self.queue.lock().map_err(|_| SimError::Poisoned)?);

        // Every launch is waited for even after one fails.
        let mut first_error = None;
        for handle in pending {
            let outcome = handle.join().unwrap_or(Err(SimError::Poisoned));
            if let Err(err) = outcome {
                tracing::warn!(%err, "sim launch failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn copy_to_host(&self, buffer: &SimBuffer, host: &mut [i32]) -> Result<(), SimError> {
        self.synchronize()?;
        if self.take_fault(|f| *f == InjectedFault::CopyToHost).is_some() {
            return Err(SimError::TransferFault("device to host"));
        }
        let cells = read(&buffer.cells)?;
        if cells.len() != host.len() {
            return Err(SimError::SizeMismatch {
                device: cells.len(),
                host: host.len(),
            });
        }
        host.copy_from_slice(&cells);
        Ok(())
    }
}

fn read(cells: &RwLock<Vec<i32>>) -> Result<RwLockReadGuard<'_, Vec<i32>>, SimError> {
    cells.read().map_err(|_| SimError::Poisoned)
}

fn run_grid(
    reduction: Reduction,
    config: LaunchConfig,
    limits: &DeviceLimits,
    n: usize,
    panic_at: Option<(usize, usize)>,
    [a, b, res]: [&Arc<RwLock<Vec<i32>>>; 3],
) -> Result<(), SimError> {
    config.check_limits(limits)?;

    let sum = {
        let a_cells = read(a)?;
        // The same buffer may be passed twice; it is locked only once.
        let b_cells = if Arc::ptr_eq(a, b) { None } else { Some(read(b)?) };
        let a_cells = a_cells.as_slice();
        let b_cells = b_cells.as_deref().map_or(a_cells, |cells| cells.as_slice());

        let required = n.min(config.total_threads());
        for (buffer, cells) in [("a", a_cells), ("b", b_cells)] {
            if cells.len() < required {
                return Err(SimError::IllegalAddress {
                    buffer,
                    len: cells.len(),
                    required,
                });
            }
        }

        let block_sums = (0..config.blocks_per_grid)
            .into_par_iter()
            .map(|b_idx| {
                let panic_thread = panic_at.filter(|&(block, _)| block == b_idx).map(|(_, t)| t);
                run_block(reduction, config.threads_per_block, b_idx, n, panic_thread, a_cells, b_cells)
            })
            .collect::<Result<Vec<_>, _>>()?;
        block_sums.into_iter().flatten().last()
    };

    let mut res = res.write().map_err(|_| SimError::Poisoned)?;
    let cell = res.first_mut().ok_or(SimError::IllegalAddress {
        buffer: "res",
        len: 0,
        required: 1,
    })?;
    if let Some(sum) = sum {
        *cell = sum;
    }
    Ok(())
}

/// Runs one block with an OS thread per device thread. Returns the value
/// produced by the block's result thread, if it has one.
fn run_block(
    reduction: Reduction,
    b_dim: usize,
    b_idx: usize,
    n: usize,
    panic_thread: Option<usize>,
    a: &[i32],
    b: &[i32],
) -> Result<Option<i32>, SimError> {
    let scratch: Vec<AtomicI32> = (0..b_dim).map(|_| AtomicI32::new(0)).collect();
    let barrier = BlockBarrier::new(b_dim);

    thread::scope(|s| {
        let mut handles = Vec::with_capacity(b_dim);
        for t_idx in 0..b_dim {
            let block = SimBlock {
                t_idx,
                b_idx,
                b_dim,
                scratch: &scratch,
                barrier: &barrier,
            };
            let spawned = thread::Builder::new()
                .stack_size(THREAD_STACK_SIZE)
                .spawn_scoped(s, move || {
                    let _guard = AbortOnPanic {
                        barrier: block.barrier,
                        t_idx,
                    };
                    if panic_thread == Some(t_idx) {
                        panic::resume_unwind(Box::new(InjectedPanic));
                    }
                    dot_block(&block, reduction, n, a, b)
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // Threads already parked on the barrier would wait forever.
                    barrier.abort(t_idx);
                    handles.into_iter().for_each(|h| {
                        let _ = h.join();
                    });
                    return Err(SimError::OutOfResources(err.to_string()));
                }
            }
        }

        let mut sum = None;
        let mut faulted = false;
        for handle in handles {
            match handle.join() {
                Ok(Some(value)) => sum = Some(value),
                Ok(None) => {}
                Err(_) => faulted = true,
            }
        }
        if faulted {
            let thread = barrier.aborted_by().unwrap_or(0);
            return Err(SimError::KernelFault {
                block: b_idx,
                thread,
            });
        }
        Ok(sum)
    })
}

/// One device thread's handle on its simulated block.
struct SimBlock<'a> {
    t_idx: usize,
    b_idx: usize,
    b_dim: usize,
    scratch: &'a [AtomicI32],
    barrier: &'a BlockBarrier,
}

impl Block for SimBlock<'_> {
    fn thread_idx(&self) -> usize {
        self.t_idx
    }

    fn block_idx(&self) -> usize {
        self.b_idx
    }

    fn block_dim(&self) -> usize {
        self.b_dim
    }

    fn sync_threads(&self) {
        self.barrier.wait();
    }

    // Relaxed is enough: the barrier's mutex orders scratch accesses across
    // threads.
    fn scratch_load(&self, i: usize) -> i32 {
        self.scratch[i].load(Ordering::Relaxed)
    }

    fn scratch_store(&self, i: usize, value: i32) {
        self.scratch[i].store(value, Ordering::Relaxed);
    }
}

/// Unwind payload of threads released from an aborted barrier.
struct BarrierAborted;

#[derive(Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    aborted_by: Option<usize>,
}

/// A reusable block barrier that can be torn down when one of its threads
/// dies, so the rest of the block does not wait for it forever.
struct BlockBarrier {
    threads: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl BlockBarrier {
    fn new(threads: usize) -> Self {
        Self {
            threads,
            state: Mutex::new(BarrierState::default()),
            cvar: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.aborted_by.is_some() {
            drop(state);
            panic::resume_unwind(Box::new(BarrierAborted));
        }

        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.threads {
            state.arrived = 0;
            state.generation += 1;
            self.cvar.notify_all();
            return;
        }

        while state.generation == generation && state.aborted_by.is_none() {
            state = self.cvar.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        if state.generation == generation {
            drop(state);
            panic::resume_unwind(Box::new(BarrierAborted));
        }
    }

    /// Releases every waiting thread by unwinding it. The first thread to abort
    /// is remembered as the cause.
    fn abort(&self, t_idx: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.aborted_by.get_or_insert(t_idx);
        self.cvar.notify_all();
    }

    fn aborted_by(&self) -> Option<usize> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .aborted_by
    }
}

struct AbortOnPanic<'a> {
    barrier: &'a BlockBarrier,
    t_idx: usize,
}

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.barrier.abort(self.t_idx);
        }
    }
}
