//! Per-core offset/gain estimation from a noise-like snapshot.
//!
//! The input is assumed to be zero-mean noise; that is a precondition, not
//! something verified here. On a tone the numbers are meaningless.

use adcmon_traits::NUM_CORES;

/// Start index of each logical core's sub-sequence within the interleaved
/// capture stream. Cores are read out in the order A, C, B, D; this table
/// reflects that physical wiring and must not be inferred or generalized.
pub const CORE_START: [usize; NUM_CORES] = [0, 2, 1, 3];

/// Converts a mean sample code to a physical offset value.
pub const OFFSET_SCALE: f32 = -500.0 / 256.0;

/// One snapshot's worth of per-core statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoiseEstimate {
    /// Per-core DC offset in physical units.
    pub offs: [f32; NUM_CORES],
    /// Per-core gain as percent deviation from the 4-core average amplitude.
    pub gains: [f32; NUM_CORES],
    /// Per-core count of full-scale codes (-128 or 127).
    pub overload: [u32; NUM_CORES],
    /// 4-core average of the offsets.
    pub avz: f32,
    /// 4-core average of the amplitudes.
    pub avamp: f32,
}

/// Estimate per-core offset, gain and overload counts from one snapshot.
///
/// Each core sees every fourth sample starting at its `CORE_START` index.
/// Amplitude is the mean absolute deviation from the core's mean. A
/// degenerate all-zero snapshot yields zero offsets and amplitudes and a
/// defined gain of 0 for every core (no NaN).
pub fn estimate_from_noise(samples: &[i8]) -> NoiseEstimate {
    let mut est = NoiseEstimate::default();
    let mut amps = [0.0f32; NUM_CORES];

    for core in 0..NUM_CORES {
        let start = CORE_START[core];
        let mut cnt = 0u32;
        let mut sum = 0i64;
        let mut i = start;
        while i < samples.len() {
            let code = samples[i] as i32;
            cnt += 1;
            sum += code as i64;
            if code == i8::MIN as i32 || code == i8::MAX as i32 {
                est.overload[core] += 1;
            }
            i += NUM_CORES;
        }
        if cnt == 0 {
            continue;
        }
        let mean = sum as f32 / cnt as f32;
        let mut amp = 0.0f32;
        let mut i = start;
        while i < samples.len() {
            amp += (samples[i] as f32 - mean).abs();
            i += NUM_CORES;
        }
        let amp = amp / cnt as f32;
        let off = mean * OFFSET_SCALE;
        est.offs[core] = off;
        amps[core] = amp;
        est.avz += off;
        est.avamp += amp;
    }

    est.avz /= NUM_CORES as f32;
    est.avamp /= NUM_CORES as f32;
    for core in 0..NUM_CORES {
        est.gains[core] = if est.avamp != 0.0 {
            100.0 * (est.avamp - amps[core]) / est.avamp
        } else {
            0.0
        };
    }
    est
}
