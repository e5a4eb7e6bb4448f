//! Pitch correction: scales, detection, shifting and whole-file tuning.
//!
//! The live pipeline only touches this module through [`PitchCorrector`]
//! and [`CorrectionTarget`].  Everything else is either the default
//! engine's internals or the offline batch path.
//!
//! ```text
//! block ─▶ YinDetector ─▶ CorrectionTarget::target_for ─▶ shift_pitch ─▶ block'
//! ```

pub mod batch;
pub mod detect;
pub mod engine;
pub mod midi;
pub mod scale;
pub mod shift;

pub use batch::{
    correct_file_to_midi, correct_file_to_note, correct_file_to_scale, BatchError, BATCH_BLOCK,
};
pub use detect::YinDetector;
pub use engine::{
    correct_to_note, correct_to_scale, AutotuneEngine, CorrectionError, CorrectionTarget,
    PitchCorrector,
};
pub use midi::{MidiError, MidiFile, NoteSpan};
pub use scale::{Mode, Scale, ScaleError, DEFAULT_A4_HZ};
pub use shift::shift_pitch;

#[cfg(test)]
pub use engine::MockCorrector;
