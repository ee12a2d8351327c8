//! Criterion benchmarks for the dependent-quantization trellis.
//!
//! Tracks the cost of one full quantize call across transform sizes and a
//! dense-versus-sparse coefficient mix. The scan cache and workspace are
//! reused across iterations, as an encoder worker would.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use zenquant::{ChannelType, DepQuant, ScanCache, TransformUnit, UniformRateOracle};

fn make_coeffs(rng: &mut StdRng, n: usize, density: f64, amp: i32) -> Vec<i32> {
    (0..n)
        .map(|_| {
            if rng.random_bool(density) {
                rng.random_range(-amp..=amp)
            } else {
                0
            }
        })
        .collect()
}

fn bench_quantize(c: &mut Criterion) {
    let mut group = c.benchmark_group("quantize");
    let mut rng = StdRng::seed_from_u64(0xbe9c);

    for (log2, label) in [(2u8, "4x4"), (3, "8x8"), (4, "16x16"), (5, "32x32")] {
        let n = 1usize << (2 * log2);
        let sparse = make_coeffs(&mut rng, n, 0.15, 1500);
        let dense = make_coeffs(&mut rng, n, 0.85, 3000);

        let mut dq = DepQuant::new();
        let mut cache = ScanCache::new();
        let mut levels = vec![0i32; n];

        group.throughput(Throughput::Elements(n as u64));
        for (coeffs, kind) in [(&sparse, "sparse"), (&dense, "dense")] {
            group.bench_with_input(
                BenchmarkId::new(label, kind),
                coeffs.as_slice(),
                |b, coeffs| {
                    b.iter(|| {
                        let mut tu = TransformUnit::new(
                            black_box(coeffs),
                            &mut levels,
                            log2,
                            log2,
                            ChannelType::Luma,
                            30,
                            10,
                        )
                        .unwrap();
                        dq.quantize(&mut tu, &UniformRateOracle, 1.0, &mut cache)
                            .unwrap()
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_quantize);
criterion_main!(benches);
