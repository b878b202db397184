use adcmon_core::estimate_from_noise;
use criterion::{Criterion, black_box, criterion_group, criterion_main};

// Synthetic noise-like capture: xorshift codes folded into i8.
fn synth_capture(n: usize, seed: u32) -> Vec<i8> {
    let mut state = seed.max(1);
    let mut next = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        x
    };
    (0..n).map(|_| (next() & 0xff) as u8 as i8).collect()
}

fn bench_estimator(c: &mut Criterion) {
    let full = synth_capture(16_384, 0xadc5);
    c.bench_function("estimate_from_noise/16384", |b| {
        b.iter(|| estimate_from_noise(black_box(&full)))
    });

    let short = synth_capture(1_024, 0xadc5);
    c.bench_function("estimate_from_noise/1024", |b| {
        b.iter(|| estimate_from_noise(black_box(&short)))
    });
}

criterion_group!(benches, bench_estimator);
criterion_main!(benches);
