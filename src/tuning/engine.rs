//! Pitch-correction engine trait and the default implementation.
//!
//! # Overview
//!
//! [`PitchCorrector`] is the seam the processing worker calls once per block.
//! It is object-safe and `Send + Sync` so the pipeline holds it behind an
//! `Arc<dyn PitchCorrector>`.
//!
//! [`AutotuneEngine`] is the production implementation: YIN pitch detection
//! followed by a delay-line pitch shift toward the target.
//!
//! [`MockCorrector`] (available under `#[cfg(test)]`) returns canned results
//! so pipeline tests do not depend on DSP behaviour.

use std::sync::Arc;

use thiserror::Error;

use super::detect::YinDetector;
use super::scale::Scale;
use super::shift::{shift_pitch, DEFAULT_GRAIN};

// ---------------------------------------------------------------------------
// CorrectionError
// ---------------------------------------------------------------------------

/// Errors the engine may return for a single block.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CorrectionError {
    #[error("empty block")]
    EmptyBlock,

    /// The block is too short to hold two periods of the lowest pitch.
    #[error("block of {len} samples is too short (minimum {min})")]
    BlockTooShort { len: usize, min: usize },

    #[error("invalid sample rate {0}")]
    InvalidSampleRate(u32),

    /// A target or detected pitch was non-positive or non-finite.
    #[error("invalid pitch {0} Hz")]
    InvalidPitch(f32),

    /// The engine returned a block of the wrong length.
    #[error("engine returned {got} samples for a {expected}-sample block")]
    LengthMismatch { expected: usize, got: usize },

    #[error("correction failed: {0}")]
    Engine(String),
}

// ---------------------------------------------------------------------------
// CorrectionTarget
// ---------------------------------------------------------------------------

/// What a block is corrected toward.  Mode and target travel together so an
/// inconsistent pair cannot be expressed.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrectionTarget {
    /// Round to the nearest pitch in the scale.
    Scale(Arc<Scale>),
    /// Pull every voiced block to one fixed frequency in Hz.
    Note(f32),
}

impl CorrectionTarget {
    /// The pitch a block detected at `detected_hz` should be moved to.
    pub fn target_for(&self, detected_hz: f32) -> f32 {
        match self {
            CorrectionTarget::Scale(scale) => scale.closest_pitch(detected_hz),
            CorrectionTarget::Note(hz) => *hz,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            CorrectionTarget::Scale(_) => "scale",
            CorrectionTarget::Note(_) => "note",
        }
    }
}

// ---------------------------------------------------------------------------
// PitchCorrector trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface for pitch-correction engines.
///
/// # Contract
///
/// - `block` is mono `f32` PCM at `sample_rate` Hz.
/// - On success the returned block has exactly `block.len()` samples.
/// - Each call is independent; no state carries across blocks.
pub trait PitchCorrector: Send + Sync {
    fn correct(
        &self,
        block: &[f32],
        sample_rate: u32,
        target: &CorrectionTarget,
    ) -> Result<Vec<f32>, CorrectionError>;
}

// Compile-time assertion: Box<dyn PitchCorrector> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn PitchCorrector>) {}
};

// ---------------------------------------------------------------------------
// AutotuneEngine
// ---------------------------------------------------------------------------

/// Detect-then-shift corrector.
#[derive(Debug, Clone)]
pub struct AutotuneEngine {
    pub detector: YinDetector,
    /// Grain length of the pitch shifter in samples.
    pub grain: usize,
    /// Shift factors are clamped to `[1 / max_shift, max_shift]`.
    pub max_shift: f32,
}

impl Default for AutotuneEngine {
    fn default() -> Self {
        Self {
            detector: YinDetector::default(),
            grain: DEFAULT_GRAIN,
            max_shift: 2.0,
        }
    }
}

impl PitchCorrector for AutotuneEngine {
    fn correct(
        &self,
        block: &[f32],
        sample_rate: u32,
        target: &CorrectionTarget,
    ) -> Result<Vec<f32>, CorrectionError> {
        if block.is_empty() {
            return Err(CorrectionError::EmptyBlock);
        }
        if sample_rate == 0 {
            return Err(CorrectionError::InvalidSampleRate(sample_rate));
        }

        let Some(detected) = self.detector.detect(block, sample_rate)? else {
            return Ok(block.to_vec());
        };

        let wanted = target.target_for(detected);
        if !(wanted > 0.0) || !wanted.is_finite() {
            return Err(CorrectionError::InvalidPitch(wanted));
        }

        let factor = (wanted / detected).clamp(1.0 / self.max_shift, self.max_shift);
        log::trace!(
            "engine: detected {detected:.1} Hz → {wanted:.1} Hz ({} target, factor {factor:.4})",
            target.label()
        );
        Ok(shift_pitch(block, factor, self.grain))
    }
}

/// Correct one block toward the nearest pitch of `scale` with the default
/// engine.
pub fn correct_to_scale(
    block: &[f32],
    sample_rate: u32,
    scale: &Scale,
) -> Result<Vec<f32>, CorrectionError> {
    AutotuneEngine::default().correct(
        block,
        sample_rate,
        &CorrectionTarget::Scale(Arc::new(scale.clone())),
    )
}

/// Correct one block toward `target_hz` with the default engine.
pub fn correct_to_note(
    block: &[f32],
    sample_rate: u32,
    target_hz: f32,
) -> Result<Vec<f32>, CorrectionError> {
    if !(target_hz > 0.0) || !target_hz.is_finite() {
        return Err(CorrectionError::InvalidPitch(target_hz));
    }
    AutotuneEngine::default().correct(block, sample_rate, &CorrectionTarget::Note(target_hz))
}

// ---------------------------------------------------------------------------
// MockCorrector  (test-only)
// ---------------------------------------------------------------------------

/// A test double for the pipeline.
#[cfg(test)]
pub enum MockCorrector {
    /// Returns the input unchanged.
    Identity,
    /// Multiplies every sample by a constant (makes output distinguishable).
    Gain(f32),
    /// Always fails.
    Fail,
    /// Sleeps before returning the input, simulating a slow engine.
    Stall(std::time::Duration),
    /// Fails on blocks whose first sample is negative; identity otherwise.
    FailNegative,
}

#[cfg(test)]
impl PitchCorrector for MockCorrector {
    fn correct(
        &self,
        block: &[f32],
        _sample_rate: u32,
        _target: &CorrectionTarget,
    ) -> Result<Vec<f32>, CorrectionError> {
        match self {
            MockCorrector::Identity => Ok(block.to_vec()),
            MockCorrector::Gain(g) => Ok(block.iter().map(|s| s * g).collect()),
            MockCorrector::Fail => Err(CorrectionError::Engine("mock failure".into())),
            MockCorrector::Stall(d) => {
                std::thread::sleep(*d);
                Ok(block.to_vec())
            }
            MockCorrector::FailNegative => {
                if block.first().is_some_and(|&s| s < 0.0) {
                    Err(CorrectionError::Engine("negative block".into()))
                } else {
                    Ok(block.to_vec())
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
