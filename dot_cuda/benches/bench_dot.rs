use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode};
use dot_cuda::{dot_product, reference_dot, LaunchConfig, Reduction, SimDevice};
use rand::{Rng, SeedableRng};
use rand_hc::Hc128Rng;
use rayon::prelude::*;

const SEED: &[u8; 32] = b"LVXn6sWNasjDReRS2OZ9a0eY1aprVNYX";

/// Creates a vector of the given length with small random elements.
fn create_random_vector(len: usize, rng: &mut impl Rng) -> Vec<i32> {
    (0..len).map(|_| rng.gen_range(-100..100)).collect()
}

pub fn reduction_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("Reduction comparison");
    group.sample_size(10);
    group.sampling_mode(SamplingMode::Flat);

    let device = SimDevice::new();

    for len in [64usize, 256, 1024] {
        let mut rng = Hc128Rng::from_seed(*SEED);
        let a = create_random_vector(len, &mut rng);
        let b = create_random_vector(len, &mut rng);
        let config = LaunchConfig::single_block(len);

        group.bench_with_input(BenchmarkId::new("Serial", len), &len, |bench, _| {
            bench.iter(|| dot_product(&device, &a, &b, config, Reduction::Serial).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("Tree", len), &len, |bench, _| {
            bench.iter(|| dot_product(&device, &a, &b, config, Reduction::Tree).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("Sequential CPU", len), &len, |bench, _| {
            bench.iter(|| reference_dot(&a, &b))
        });

        group.bench_with_input(BenchmarkId::new("Rayon CPU", len), &len, |bench, _| {
            bench.iter(|| {
                a.par_iter()
                    .zip(&b)
                    .map(|(x, y)| x.wrapping_mul(*y))
                    .reduce(|| 0, i32::wrapping_add)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, reduction_comparison);
criterion_main!(benches);
