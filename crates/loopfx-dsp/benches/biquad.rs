//! Biquad filter benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use loopfx_dsp::biquad::{BiquadTdf2, FilterType};
use loopfx_dsp::MonoProcessor;

fn bench_biquad_lowpass(c: &mut Criterion) {
    let mut filter = BiquadTdf2::new(48_000.0);
    filter.set_design(FilterType::Lowpass, 1_000.0, 0.707, 0.0);

    let mut buffer: Vec<f64> = (0..1024).map(|i| (i as f64 * 0.01).sin()).collect();

    c.bench_function("biquad_lowpass_1024", |b| {
        b.iter(|| {
            filter.process_block(black_box(&mut buffer));
        })
    });
}

fn bench_biquad_peaking(c: &mut Criterion) {
    let mut filter = BiquadTdf2::new(48_000.0);
    filter.set_design(FilterType::Peaking, 1_000.0, 1.0, 6.0);

    let mut buffer: Vec<f64> = (0..1024).map(|i| (i as f64 * 0.01).sin()).collect();

    c.bench_function("biquad_peaking_1024", |b| {
        b.iter(|| {
            filter.process_block(black_box(&mut buffer));
        })
    });
}

criterion_group!(benches, bench_biquad_lowpass, bench_biquad_peaking);
criterion_main!(benches);
