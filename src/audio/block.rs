//! Block types and channel/sample conversion.
//!
//! The device side produces [`CapturedBlock`]s: exactly one block's worth of
//! interleaved frames in whatever sample format the hardware speaks.  The
//! processing worker turns each one into an [`AudioBlock`] (mono `f32`) with
//! [`CapturedBlock::to_mono`] before handing it to the corrector.

use cpal::Sample;

/// Mono `f32` samples in `[-1.0, 1.0]`; the unit of correction and playback.
pub type AudioBlock = Vec<f32>;

// ---------------------------------------------------------------------------
// SampleBuffer
// ---------------------------------------------------------------------------

/// Interleaved samples in the device's native representation.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuffer {
    F32(Vec<f32>),
    I16(Vec<i16>),
    U16(Vec<u16>),
}

impl SampleBuffer {
    /// Total number of interleaved samples.
    pub fn len(&self) -> usize {
        match self {
            SampleBuffer::F32(v) => v.len(),
            SampleBuffer::I16(v) => v.len(),
            SampleBuffer::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coerce to `f32` in `[-1.0, 1.0]`.
    pub fn to_f32(&self) -> Vec<f32> {
        match self {
            SampleBuffer::F32(v) => v.clone(),
            SampleBuffer::I16(v) => v.iter().map(|s| s.to_sample::<f32>()).collect(),
            SampleBuffer::U16(v) => v.iter().map(|s| s.to_sample::<f32>()).collect(),
        }
    }
}

/// Sample types the capture side accepts from a device.
pub trait RawSample: Copy + Send + 'static {
    fn into_buffer(samples: Vec<Self>) -> SampleBuffer;
}

impl RawSample for f32 {
    fn into_buffer(samples: Vec<Self>) -> SampleBuffer {
        SampleBuffer::F32(samples)
    }
}

impl RawSample for i16 {
    fn into_buffer(samples: Vec<Self>) -> SampleBuffer {
        SampleBuffer::I16(samples)
    }
}

impl RawSample for u16 {
    fn into_buffer(samples: Vec<Self>) -> SampleBuffer {
        SampleBuffer::U16(samples)
    }
}

// ---------------------------------------------------------------------------
// CapturedBlock
// ---------------------------------------------------------------------------

/// One block of raw captured audio, copied out of the device buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedBlock {
    /// Interleaved samples, `frames() * channels` long.
    pub samples: SampleBuffer,
    /// Number of interleaved channels (1 = mono, 2 = stereo, …).
    pub channels: u16,
}

impl CapturedBlock {
    pub fn new(samples: SampleBuffer, channels: u16) -> Self {
        Self { samples, channels }
    }

    /// Wrap an already-mono `f32` block.
    pub fn mono(samples: Vec<f32>) -> Self {
        Self::new(SampleBuffer::F32(samples), 1)
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        match self.channels {
            0 => 0,
            n => self.samples.len() / n as usize,
        }
    }

    /// Coerce to `f32` and average all channels down to one.
    pub fn to_mono(&self) -> AudioBlock {
        downmix_to_mono(&self.samples.to_f32(), self.channels)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`; a trailing partial frame
/// is ignored.  `channels == 0` yields an empty vector.
///
/// ```rust
/// use live_autotune::audio::downmix_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = downmix_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Root-mean-square level of `samples`; `0.0` for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_passthrough() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(downmix_to_mono(&input, 1), input);
    }

    #[test]
    fn zero_channels_is_empty() {
        assert!(downmix_to_mono(&[0.5, 0.5], 0).is_empty());
    }

    #[test]
    fn four_channels_average() {
        let quad = vec![1.0_f32, 0.0, 0.0, -1.0, 0.4, 0.4, 0.4, 0.4];
        let mono = downmix_to_mono(&quad, 4);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.0).abs() < 1e-6);
        assert!((mono[1] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn i16_block_coerces_to_unit_range() {
        let block = CapturedBlock::new(SampleBuffer::I16(vec![i16::MAX, 0, i16::MIN, 0]), 2);
        assert_eq!(block.frames(), 2);
        let mono = block.to_mono();
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.5).abs() < 1e-3);
        assert!((mono[1] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn u16_midpoint_is_silence() {
        let block = CapturedBlock::new(SampleBuffer::U16(vec![32_768; 8]), 1);
        assert!(block.to_mono().iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn silent_stereo_block_stays_silent() {
        let block = CapturedBlock::new(SampleBuffer::F32(vec![0.0; 8192]), 2);
        let mono = block.to_mono();
        assert_eq!(mono.len(), 4096);
        assert!(mono.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn rms_of_constant_and_empty() {
        assert!((rms(&[0.5; 100]) - 0.5).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn captured_block_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CapturedBlock>();
    }
}
