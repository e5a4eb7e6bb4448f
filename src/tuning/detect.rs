//! Fundamental-frequency estimation with the YIN algorithm.
//!
//! [`YinDetector::detect`] returns `Ok(None)` for silent or unvoiced blocks so
//! callers can pass them through untouched.

use super::engine::CorrectionError;
use crate::audio::rms;

/// Pitch detector parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YinDetector {
    /// Lowest detectable fundamental in Hz.
    pub min_hz: f32,
    /// Highest detectable fundamental in Hz.
    pub max_hz: f32,
    /// Cumulative-mean-normalised difference threshold; lower is stricter.
    pub threshold: f32,
    /// RMS below which a block is treated as silence.
    pub silence_rms: f32,
}

impl Default for YinDetector {
    fn default() -> Self {
        Self {
            min_hz: 60.0,
            max_hz: 2000.0,
            threshold: 0.15,
            silence_rms: 1e-3,
        }
    }
}

impl YinDetector {
    /// Largest lag searched at `sample_rate`.
    fn max_lag(&self, sample_rate: u32) -> usize {
        (sample_rate as f32 / self.min_hz).ceil() as usize
    }

    fn min_lag(&self, sample_rate: u32) -> usize {
        ((sample_rate as f32 / self.max_hz).floor() as usize).max(2)
    }

    /// Shortest block that can be analysed at `sample_rate`.
    pub fn min_block_len(&self, sample_rate: u32) -> usize {
        2 * self.max_lag(sample_rate)
    }

    /// Estimate the fundamental frequency of `block` in Hz.
    ///
    /// # Errors
    ///
    /// [`CorrectionError::BlockTooShort`] when the block cannot hold two
    /// periods of the lowest detectable pitch.
    pub fn detect(&self, block: &[f32], sample_rate: u32) -> Result<Option<f32>, CorrectionError> {
        let min_len = self.min_block_len(sample_rate);
        if block.len() < min_len {
            return Err(CorrectionError::BlockTooShort {
                len: block.len(),
                min: min_len,
            });
        }
        if rms(block) < self.silence_rms {
            return Ok(None);
        }

        let max_lag = self.max_lag(sample_rate);
        let min_lag = self.min_lag(sample_rate);
        let window = block.len() - max_lag;

        // Difference function d(tau).
        let mut diff = vec![0.0f32; max_lag + 1];
        for (tau, d) in diff.iter_mut().enumerate().skip(1) {
            *d = block[..window]
                .iter()
                .zip(&block[tau..tau + window])
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
        }

        // Cumulative mean normalised difference d'(tau).
        let mut cmnd = vec![1.0f32; max_lag + 1];
        let mut running = 0.0f32;
        for tau in 1..=max_lag {
            running += diff[tau];
            cmnd[tau] = if running > 0.0 {
                diff[tau] * tau as f32 / running
            } else {
                1.0
            };
        }

        let Some(mut tau) = (min_lag..=max_lag).find(|&t| cmnd[t] < self.threshold) else {
            return Ok(None);
        };
        while tau < max_lag && cmnd[tau + 1] < cmnd[tau] {
            tau += 1;
        }

        let refined = parabolic_peak(&cmnd, tau);
        if refined <= 0.0 {
            return Ok(None);
        }
        Ok(Some(sample_rate as f32 / refined))
    }
}

/// Refine a local minimum at `index` by fitting a parabola through its
/// neighbours.
fn parabolic_peak(values: &[f32], index: usize) -> f32 {
    if index == 0 || index + 1 >= values.len() {
        return index as f32;
    }
    let (left, center, right) = (values[index - 1], values[index], values[index + 1]);
    let denom = 2.0 * (left + right - 2.0 * center);
    if denom == 0.0 {
        return index as f32;
    }
    index as f32 + (left - right) / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (TAU * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn detects_a440() {
        let pitch = YinDetector::default()
            .detect(&sine(440.0, 44_100, 4096), 44_100)
            .unwrap()
            .expect("voiced");
        assert!((pitch - 440.0).abs() < 2.0, "got {pitch}");
    }

    #[test]
    fn detects_low_pitch() {
        let pitch = YinDetector::default()
            .detect(&sine(110.0, 48_000, 4096), 48_000)
            .unwrap()
            .expect("voiced");
        assert!((pitch - 110.0).abs() < 1.0, "got {pitch}");
    }

    #[test]
    fn silence_is_unvoiced() {
        let result = YinDetector::default().detect(&vec![0.0; 4096], 44_100).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn short_block_is_an_error() {
        let err = YinDetector::default()
            .detect(&vec![0.1; 256], 44_100)
            .unwrap_err();
        assert!(matches!(err, CorrectionError::BlockTooShort { len: 256, .. }));
    }
}
