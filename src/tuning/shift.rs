//! Length-preserving pitch shifter.
//!
//! Two read taps sweep a delay line at `1 - factor` samples per sample,
//! half a grain apart, each weighted by a triangular window so the pair
//! always sums to unit gain.  Output length equals input length, which is
//! what the block pipeline requires.

/// Default grain length in samples.
pub const DEFAULT_GRAIN: usize = 1024;

/// Factors this close to 1.0 are treated as "no shift".
const UNITY_TOLERANCE: f32 = 1e-4;

/// Shift the pitch of `block` by `factor` (2.0 = up one octave).
///
/// Reads before the start or past the end of the block clamp to the edge
/// sample.  A factor of 1.0 returns the input unchanged.
pub fn shift_pitch(block: &[f32], factor: f32, grain: usize) -> Vec<f32> {
    if block.is_empty() || (factor - 1.0).abs() < UNITY_TOLERANCE || !factor.is_finite() {
        return block.to_vec();
    }

    let grain = grain.clamp(2, block.len().max(2)) as f32;
    let half = grain / 2.0;
    let step = 1.0 - factor;

    let mut phase = 0.0f32;
    let mut out = Vec::with_capacity(block.len());
    for i in 0..block.len() {
        let delay_a = phase;
        let delay_b = (phase + half).rem_euclid(grain);

        let sample = triangle(delay_a, grain) * sample_at(block, i as f32 - delay_a)
            + triangle(delay_b, grain) * sample_at(block, i as f32 - delay_b);
        out.push(sample);

        phase = (phase + step).rem_euclid(grain);
    }
    out
}

/// Triangular window over `[0, len)`, zero at the ends and one in the middle.
fn triangle(pos: f32, len: f32) -> f32 {
    1.0 - (2.0 * pos / len - 1.0).abs()
}

/// Linearly interpolated read with edge clamping.
fn sample_at(block: &[f32], pos: f32) -> f32 {
    let last = block.len() - 1;
    let pos = pos.clamp(0.0, last as f32);
    let idx = pos as usize;
    let frac = pos - idx as f32;
    if idx >= last {
        block[last]
    } else {
        block[idx] * (1.0 - frac) + block[idx + 1] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_length() {
        let block: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.01).sin()).collect();
        for factor in [0.5, 0.9, 1.1, 2.0] {
            assert_eq!(shift_pitch(&block, factor, DEFAULT_GRAIN).len(), block.len());
        }
    }

    #[test]
    fn unity_factor_is_identity() {
        let block = vec![0.1, -0.2, 0.3, -0.4];
        assert_eq!(shift_pitch(&block, 1.0, DEFAULT_GRAIN), block);
    }

    #[test]
    fn silence_stays_silent() {
        let out = shift_pitch(&vec![0.0; 2048], 1.3, DEFAULT_GRAIN);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn constant_signal_keeps_unit_gain() {
        let out = shift_pitch(&vec![0.5; 4096], 1.7, 512);
        for s in out {
            assert!((s - 0.5).abs() < 1e-4, "gain drift: {s}");
        }
    }

    #[test]
    fn empty_block_is_empty() {
        assert!(shift_pitch(&[], 2.0, DEFAULT_GRAIN).is_empty());
    }
}
