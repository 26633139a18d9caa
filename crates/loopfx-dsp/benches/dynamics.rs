//! Dynamics processor benchmarks

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use loopfx_dsp::dynamics::{Compressor, Limiter};
use loopfx_dsp::StereoProcessor;

fn bench_compressor(c: &mut Criterion) {
    let mut group = c.benchmark_group("compressor");

    for ratio in [2.0, 4.0, 10.0] {
        let mut comp = Compressor::new(48_000.0);
        comp.set_threshold_db(-18.0);
        comp.set_ratio(ratio);
        comp.set_attack_ms(10.0);
        comp.set_release_ms(100.0);

        let left: Vec<f64> = (0..1024).map(|i| (i as f64 * 0.01).sin() * 0.5).collect();
        let right: Vec<f64> = (0..1024).map(|i| (i as f64 * 0.01).cos() * 0.5).collect();

        group.bench_with_input(BenchmarkId::from_parameter(ratio), &ratio, |b, _| {
            b.iter(|| {
                for (&l, &r) in left.iter().zip(right.iter()) {
                    criterion::black_box(comp.process_sample(l, r));
                }
            })
        });
    }

    group.finish();
}

fn bench_limiter(c: &mut Criterion) {
    let mut limiter = Limiter::new(48_000.0);
    limiter.set_ceiling_db(-0.3);

    let left: Vec<f64> = (0..1024).map(|i| (i as f64 * 0.01).sin()).collect();
    let right: Vec<f64> = (0..1024).map(|i| (i as f64 * 0.01).cos()).collect();

    c.bench_function("limiter_1024", |b| {
        b.iter(|| {
            for (&l, &r) in left.iter().zip(right.iter()) {
                criterion::black_box(limiter.process_sample(l, r));
            }
        })
    });
}

criterion_group!(benches, bench_compressor, bench_limiter);
criterion_main!(benches);
