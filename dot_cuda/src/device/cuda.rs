use super::Device;
use crate::launch::{DeviceLimits, LaunchConfig};
use cust::{
    context::Context,
    device::{Device as CuDevice, DeviceAttribute},
    error::{CudaError, CudaResult},
    prelude::*,
};
use dot_gpu::Reduction;

static PTX: &str = include_str!("../../../resources/dot_gpu.ptx");

/// The first CUDA device, with the `dot_gpu` kernels loaded.
pub struct CudaDevice {
    name: String,
    limits: DeviceLimits,
    module: Module,
    stream: Stream,
    // Dropped last; everything above belongs to this context.
    _context: Context,
}

impl CudaDevice {
    pub fn new() -> CudaResult<Self> {
        let context = cust::quick_init()?;
        let device = CuDevice::get_device(0)?;
        let limits = DeviceLimits::from_device(
            device.get_attribute(DeviceAttribute::MaxThreadsPerBlock)? as usize,
            device.get_attribute(DeviceAttribute::MaxGridDimX)? as usize,
        );
        let name = device.name()?;
        let module = Module::from_ptx(PTX, &[])?;
        let stream = Stream::new(StreamFlags::NON_BLOCKING, None)?;
        tracing::info!(%name, ?limits, "cuda device ready");

        Ok(Self {
            name,
            limits,
            module,
            stream,
            _context: context,
        })
    }
}

impl Device for CudaDevice {
    type Buffer = DeviceBuffer<i32>;
    type Error = CudaError;

    fn name(&self) -> &str {
        &self.name
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn alloc(&self, len: usize) -> CudaResult<DeviceBuffer<i32>> {
        // Every element is written by `copy_from_host` before a kernel reads it.
        unsafe { DeviceBuffer::uninitialized(len) }
    }

    fn alloc_zeroed(&self, len: usize) -> CudaResult<DeviceBuffer<i32>> {
        DeviceBuffer::from_slice(&vec![0i32; len])
    }

    fn copy_from_host(&self, buffer: &mut DeviceBuffer<i32>, host: &[i32]) -> CudaResult<()> {
        if buffer.len() != host.len() {
            return Err(CudaError::InvalidValue);
        }
        self.stream.synchronize()?;
        buffer.copy_from(host)
    }

    fn launch(
        &self,
        reduction: Reduction,
        config: LaunchConfig,
        n: usize,
        a: &DeviceBuffer<i32>,
        b: &DeviceBuffer<i32>,
        res: &DeviceBuffer<i32>,
    ) -> CudaResult<()> {
        let kernel_name = match reduction {
            Reduction::Serial => "dot_serial",
            Reduction::Tree => "dot_tree",
        };
        let kernel = self.module.get_function(kernel_name)?;
        let stream = &self.stream;
        let blocks = config.blocks_per_grid as u32;
        let threads = config.threads_per_block as u32;

        unsafe {
            launch!(
                // slices are passed as two parameters, the pointer and the length.
                kernel<<<blocks, threads, 0, stream>>>(
                    n,
                    a.as_device_ptr(),
                    a.len(),
                    b.as_device_ptr(),
                    b.len(),
                    res.as_device_ptr()
                )
            )
        }
    }

    fn synchronize(&self) -> CudaResult<()> {
        self.stream.synchronize()
    }

    fn copy_to_host(&self, buffer: &DeviceBuffer<i32>, host: &mut [i32]) -> CudaResult<()> {
        if buffer.len() != host.len() {
            return Err(CudaError::InvalidValue);
        }
        // The stream is non-blocking, so queued kernels have to be waited for
        // explicitly before the copy.
        self.stream.synchronize()?;
        buffer.copy_to(host)
    }
}
