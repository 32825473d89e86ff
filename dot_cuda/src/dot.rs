use crate::{
    device::Device,
    error::{check, DotError, Stage},
    launch::LaunchConfig,
};
use dot_gpu::Reduction;

/// Computes `a · b` on `device`.
///
/// The inputs are copied to device memory, the kernel is launched with
/// `config`, and the scalar result is copied back. `config` must place every
/// index inside the first block. The device buffers are freed on return.
pub fn dot_product<D>(
    device: &D,
    a: &[i32],
    b: &[i32],
    config: LaunchConfig,
    reduction: Reduction,
) -> Result<i32, DotError>
where
    D: Device,
{
    if a.len() != b.len() {
        return Err(DotError::LengthMismatch {
            a: a.len(),
            b: b.len(),
        });
    }
    let n = a.len();
    config.validate(n, &device.limits())?;

    let _span = tracing::info_span!(
        "dot_product",
        device = device.name(),
        n,
        blocks = config.blocks_per_grid,
        threads = config.threads_per_block,
        ?reduction
    )
    .entered();

    // Allocate memory on the device and copy the inputs over.
    let mut dev_a = check(Stage::Allocation, "allocate a", device.alloc(n))?;
    let mut dev_b = check(Stage::Allocation, "allocate b", device.alloc(n))?;
    check(Stage::Transfer, "copy a to device", device.copy_from_host(&mut dev_a, a))?;
    check(Stage::Transfer, "copy b to device", device.copy_from_host(&mut dev_b, b))?;
    let dev_res = check(Stage::Allocation, "allocate result", device.alloc_zeroed(1))?;

    check(
        Stage::Launch,
        "launch kernel",
        device.launch(reduction, config, n, &dev_a, &dev_b, &dev_res),
    )?;
    check(Stage::Execution, "synchronize", device.synchronize())?;

    // Copy the result back to the host.
    let mut res = [0i32; 1];
    check(Stage::Transfer, "copy result to host", device.copy_to_host(&dev_res, &mut res))?;

    tracing::debug!(result = res[0], "dot product finished");
    Ok(res[0])
}

/// Sequential dot product with the same wrapping arithmetic as the kernel.
pub fn reference_dot(a: &[i32], b: &[i32]) -> i32 {
    a.iter()
        .zip(b)
        .fold(0i32, |sum, (x, y)| sum.wrapping_add(x.wrapping_mul(*y)))
}

/// The dot product of two length-`n` vectors filled with `a` and `b`.
pub fn uniform_expected(n: usize, a: i32, b: i32) -> i32 {
    (n as i32).wrapping_mul(a).wrapping_mul(b)
}

/// Compares a device result against its expected value.
pub fn verify(expected: i32, actual: i32) -> Result<(), DotError> {
    if expected == actual {
        Ok(())
    } else {
        tracing::error!(expected, actual, "result mismatch");
        Err(DotError::Mismatch { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::{dot_product, reference_dot, uniform_expected, verify};
    use crate::{
        device::sim::SimDevice,
        error::{DotError, Stage},
        launch::{LaunchConfig, LaunchError},
    };
    use dot_gpu::Reduction;

    #[test]
    fn reference_dot_test() {
        assert_eq!(reference_dot(&[1, 2, 3, 4], &[4, 3, 2, 1]), 20);
        assert_eq!(reference_dot(&[], &[]), 0);
        assert_eq!(reference_dot(&[-3], &[7]), -21);
    }

    #[test]
    fn uniform_expected_test() {
        assert_eq!(uniform_expected(1024, 1, 2), 2048);
        assert_eq!(uniform_expected(0, 5, 5), 0);
    }

    #[test]
    fn verify_test() {
        assert!(verify(2048, 2048).is_ok());
        assert!(matches!(
            verify(2048, 2047),
            Err(DotError::Mismatch {
                expected: 2048,
                actual: 2047
            })
        ));
    }

    #[test]
    fn rejects_unequal_lengths() {
        let device = SimDevice::new();
        let err = dot_product(&device, &[1, 2], &[1], LaunchConfig::single_block(2), Reduction::Serial)
            .unwrap_err();
        assert!(matches!(err, DotError::LengthMismatch { a: 2, b: 1 }));
    }

    #[test]
    fn rejects_config_before_touching_the_device() {
        let device = SimDevice::new();
        let err = dot_product(&device, &[1; 8], &[1; 8], LaunchConfig::new(1, 4), Reduction::Serial)
            .unwrap_err();
        assert!(matches!(
            err,
            DotError::Config(LaunchError::ExceedsSingleBlock {
                len: 8,
                threads_per_block: 4
            })
        ));
        assert_eq!(device.allocated_bytes(), 0);
    }

    #[test]
    fn allocation_failure_names_the_stage() {
        // Room for a but not for b.
        let device = SimDevice::new().with_memory_capacity(16);
        let err = dot_product(&device, &[1; 4], &[1; 4], LaunchConfig::single_block(4), Reduction::Serial)
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Allocation));
        assert!(err.to_string().contains("allocate b"));
        // Buffers from the failed run are released.
        assert_eq!(device.allocated_bytes(), 0);
    }

    #[test]
    fn empty_vectors() {
        let device = SimDevice::new();
        let result = dot_product(&device, &[], &[], LaunchConfig::single_block(0), Reduction::Tree).unwrap();
        assert_eq!(result, 0);
    }
}
