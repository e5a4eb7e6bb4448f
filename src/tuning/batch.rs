//! Whole-file (non-real-time) correction: WAV in, WAV out.
//!
//! These functions share nothing with the live pipeline and can be called
//! without any pipeline state.  The input is down-mixed to mono, corrected
//! block by block, peak-normalised and written as 16-bit mono PCM at the
//! source sample rate.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use super::engine::{AutotuneEngine, CorrectionError, CorrectionTarget, PitchCorrector};
use super::midi::{MidiError, MidiFile};
use super::scale::Scale;
use crate::audio::downmix_to_mono;

/// Block length used for offline correction.
pub const BATCH_BLOCK: usize = 8192;

// ---------------------------------------------------------------------------
// BatchError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("MIDI error: {0}")]
    Midi(#[from] MidiError),

    #[error("correction failed at block {block}: {source}")]
    Correction {
        block: usize,
        #[source]
        source: CorrectionError,
    },

    #[error("input file contains no audio")]
    Empty,
}

// ---------------------------------------------------------------------------
// WAV helpers
// ---------------------------------------------------------------------------

/// Read any PCM or float WAV as mono `f32` in `[-1, 1]`.
pub fn read_wav_mono(path: impl AsRef<Path>) -> Result<(Vec<f32>, u32), BatchError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    Ok((downmix_to_mono(&interleaved, spec.channels), spec.sample_rate))
}

/// Write mono `f32` samples as 16-bit PCM.
pub fn write_wav_mono(
    path: impl AsRef<Path>,
    samples: &[f32],
    sample_rate: u32,
) -> Result<(), BatchError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Block driver
// ---------------------------------------------------------------------------

/// Correct `samples` in consecutive [`BATCH_BLOCK`]-sample blocks.
///
/// `target_at` receives the block centre time in seconds and returns the
/// target for that block, or `None` to leave it untouched.  Blocks too short
/// for the engine (the tail) are copied through.
pub fn correct_samples<F>(
    samples: &[f32],
    sample_rate: u32,
    corrector: &dyn PitchCorrector,
    mut target_at: F,
) -> Result<Vec<f32>, BatchError>
where
    F: FnMut(f32) -> Option<CorrectionTarget>,
{
    if samples.is_empty() {
        return Err(BatchError::Empty);
    }

    let mut out = Vec::with_capacity(samples.len());
    for (index, block) in samples.chunks(BATCH_BLOCK).enumerate() {
        let centre = (index * BATCH_BLOCK + block.len() / 2) as f32 / sample_rate as f32;
        let Some(target) = target_at(centre) else {
            out.extend_from_slice(block);
            continue;
        };

        match corrector.correct(block, sample_rate, &target) {
            Ok(corrected) => out.extend_from_slice(&corrected),
            Err(CorrectionError::BlockTooShort { .. }) => out.extend_from_slice(block),
            Err(source) => return Err(BatchError::Correction { block: index, source }),
        }
    }

    normalize_peak(&mut out);
    Ok(out)
}

/// Scale so the loudest sample sits at full scale.  Silent input is left as is.
fn normalize_peak(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        for s in samples.iter_mut() {
            *s /= peak;
        }
    }
}

// ---------------------------------------------------------------------------
// Public batch entry points
// ---------------------------------------------------------------------------

/// Tune a WAV file to the nearest pitches of `scale`.
pub fn correct_file_to_scale(
    input: impl AsRef<Path>,
    scale: &Scale,
    output: impl AsRef<Path>,
) -> Result<(), BatchError> {
    let (samples, sample_rate) = read_wav_mono(input)?;
    let target = CorrectionTarget::Scale(Arc::new(scale.clone()));
    let out = correct_samples(&samples, sample_rate, &AutotuneEngine::default(), |_| {
        Some(target.clone())
    })?;
    log::info!("batch: corrected {} samples to scale", out.len());
    write_wav_mono(output, &out, sample_rate)
}

/// Tune a WAV file to one fixed frequency.
pub fn correct_file_to_note(
    input: impl AsRef<Path>,
    target_hz: f32,
    output: impl AsRef<Path>,
) -> Result<(), BatchError> {
    if !(target_hz > 0.0) || !target_hz.is_finite() {
        return Err(BatchError::Correction {
            block: 0,
            source: CorrectionError::InvalidPitch(target_hz),
        });
    }
    let (samples, sample_rate) = read_wav_mono(input)?;
    let out = correct_samples(&samples, sample_rate, &AutotuneEngine::default(), |_| {
        Some(CorrectionTarget::Note(target_hz))
    })?;
    log::info!("batch: corrected {} samples to {target_hz} Hz", out.len());
    write_wav_mono(output, &out, sample_rate)
}

/// Tune a WAV file to the highest note sounding in a reference MIDI file.
/// Blocks with no sounding note are left untouched.
pub fn correct_file_to_midi(
    input: impl AsRef<Path>,
    midi: impl AsRef<Path>,
    a4_hz: f32,
    output: impl AsRef<Path>,
) -> Result<(), BatchError> {
    let midi = MidiFile::load(midi)?;
    let (samples, sample_rate) = read_wav_mono(input)?;
    let out = correct_samples(&samples, sample_rate, &AutotuneEngine::default(), |t| {
        midi.highest_pitch_at(t, a4_hz).map(CorrectionTarget::Note)
    })?;
    log::info!(
        "batch: corrected {} samples against {} MIDI notes",
        out.len(),
        midi.notes().len()
    );
    write_wav_mono(output, &out, sample_rate)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::engine::MockCorrector;
    use std::f32::consts::TAU;
    use tempfile::tempdir;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (TAU * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn correct_samples_preserves_length_and_skips_untargeted_blocks() {
        let input = vec![0.25f32; BATCH_BLOCK * 2 + 100];
        let mut calls = 0;
        let out = correct_samples(&input, 44_100, &MockCorrector::Gain(2.0), |_| {
            calls += 1;
            (calls == 1).then(|| CorrectionTarget::Note(440.0))
        })
        .unwrap();

        assert_eq!(out.len(), input.len());
        // First block doubled to 0.5, rest 0.25; normalisation maps 0.5 → 1.0.
        assert!((out[0] - 1.0).abs() < 1e-6);
        assert!((out[BATCH_BLOCK + 1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn correct_samples_reports_engine_failures() {
        let err = correct_samples(&vec![0.1; 100], 44_100, &MockCorrector::Fail, |_| {
            Some(CorrectionTarget::Note(440.0))
        })
        .unwrap_err();
        assert!(matches!(err, BatchError::Correction { block: 0, .. }));
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = correct_samples(&[], 44_100, &MockCorrector::Identity, |_| None).unwrap_err();
        assert!(matches!(err, BatchError::Empty));
    }

    #[test]
    fn file_to_scale_round_trip() {
        let dir = tempdir().expect("temp dir");
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        write_wav_mono(&input, &sine(440.0, 22_050, 22_050), 22_050).unwrap();

        let scale = Scale::from_name("C major").unwrap();
        correct_file_to_scale(&input, &scale, &output).unwrap();

        let (samples, rate) = read_wav_mono(&output).unwrap();
        assert_eq!(rate, 22_050);
        assert_eq!(samples.len(), 22_050);
    }

    #[test]
    fn file_to_midi_uses_reference_notes() {
        let dir = tempdir().expect("temp dir");
        let input = dir.path().join("in.wav");
        let midi = dir.path().join("ref.mid");
        let output = dir.path().join("out.wav");
        write_wav_mono(&input, &sine(430.0, 22_050, 22_050), 22_050).unwrap();
        std::fs::write(&midi, crate::tuning::midi::tests::two_step_melody()).unwrap();

        correct_file_to_midi(&input, &midi, 440.0, &output).unwrap();

        let (samples, _) = read_wav_mono(&output).unwrap();
        assert_eq!(samples.len(), 22_050);
    }

    #[test]
    fn stereo_input_is_downmixed() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..10 {
            writer.write_sample(0.5f32).unwrap();
            writer.write_sample(-0.1f32).unwrap();
        }
        writer.finalize().unwrap();

        let (mono, rate) = read_wav_mono(&path).unwrap();
        assert_eq!(rate, 8_000);
        assert_eq!(mono.len(), 10);
        assert!((mono[0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn invalid_note_is_rejected_before_io() {
        let err = correct_file_to_note("missing.wav", 0.0, "out.wav").unwrap_err();
        assert!(matches!(
            err,
            BatchError::Correction {
                source: CorrectionError::InvalidPitch(_),
                ..
            }
        ));
    }
}
