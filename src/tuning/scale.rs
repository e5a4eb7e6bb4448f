//! Musical scales and nearest-pitch rounding.
//!
//! A [`Scale`] is a base frequency, a repeat factor (2.0 for an octave) and a
//! strictly ascending list of frequency ratios inside one repetition.  It is
//! tuning-agnostic: just intonation, equal temperament and non-octave scales
//! (Bohlen-Pierce repeats at 3:1) all use the same representation.
//!
//! # Example
//!
//! ```rust
//! use live_autotune::tuning::Scale;
//!
//! let scale = Scale::from_name_with_tuning("A minor", 440.0).unwrap();
//! // 450 Hz is closest to A4 in A minor.
//! assert!((scale.closest_pitch(450.0) - 440.0).abs() < 0.01);
//! ```

use thiserror::Error;

/// Default reference pitch of A4 in Hz used by [`Scale::from_name`].
pub const DEFAULT_A4_HZ: f32 = 442.0;

/// Scale names that need no root note.
const ATONAL_SCALES: [&str; 3] = ["chromatic", "whole-tone", "quarter-tone"];

// ---------------------------------------------------------------------------
// ScaleError
// ---------------------------------------------------------------------------

/// Errors raised while constructing a [`Scale`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScaleError {
    /// Base note, repeat factor or ratio list violates the scale invariants.
    #[error("invalid scale parameters: {0}")]
    InvalidParameters(&'static str),

    /// The name is not of the form `<root> <mode>` or an atonal scale name.
    #[error("invalid scale name '{0}': expected '<root> <mode>' such as 'Bb major' or 'F# minor pentatonic'")]
    MalformedName(String),

    /// The root note is not one of `A`–`G` with an optional `#` or `b`.
    #[error("unknown root note '{0}'")]
    UnknownRoot(String),

    /// The mode name is not in the mode table.
    #[error("unknown mode '{0}'")]
    UnknownMode(String),
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// An abstract scale template: ratios inside one repetition, without a root.
#[derive(Debug, Clone, PartialEq)]
pub struct Mode {
    pub repeat_factor: f32,
    pub ratios: Vec<f32>,
}

impl Mode {
    /// Equal-tempered mode: `steps` out of `division` equal steps per
    /// `repeat_factor`.
    pub fn equal_tempered(steps: &[u32], division: f32, repeat_factor: f32) -> Self {
        let ratios = steps
            .iter()
            .map(|&step| {
                repeat_factor
                    .powf(step as f32 / division)
                    .clamp(1.0, repeat_factor)
            })
            .collect();
        Self {
            repeat_factor,
            ratios,
        }
    }

    fn twelve_tet(steps: &[u32]) -> Self {
        Self::equal_tempered(steps, 12.0, 2.0)
    }

    /// Look up a mode by name (`"major"`, `"dorian"`, `"blues"`, ...).
    pub fn by_name(name: &str) -> Option<Self> {
        let mode = match name {
            "major just" => Self {
                repeat_factor: 2.0,
                ratios: vec![1.0, 9.0 / 8.0, 5.0 / 4.0, 4.0 / 3.0, 3.0 / 2.0, 5.0 / 3.0, 15.0 / 8.0],
            },
            "minor just" => Self {
                repeat_factor: 2.0,
                ratios: vec![1.0, 9.0 / 8.0, 6.0 / 5.0, 4.0 / 3.0, 3.0 / 2.0, 8.0 / 5.0, 9.0 / 5.0],
            },
            "ionian" | "major" => Self::twelve_tet(&[0, 2, 4, 5, 7, 9, 11]),
            "dorian" => Self::twelve_tet(&[0, 2, 3, 5, 7, 9, 10]),
            "phrygian" => Self::twelve_tet(&[0, 1, 3, 5, 7, 8, 10]),
            "lydian" => Self::twelve_tet(&[0, 2, 4, 6, 7, 9, 11]),
            "mixolydian" => Self::twelve_tet(&[0, 2, 4, 5, 7, 9, 10]),
            "aeolian" | "minor" => Self::twelve_tet(&[0, 2, 3, 5, 7, 8, 10]),
            "locrian" => Self::twelve_tet(&[0, 1, 3, 5, 6, 8, 10]),
            "harmonic minor" => Self::twelve_tet(&[0, 2, 3, 5, 7, 8, 11]),
            "melodic minor" => Self::twelve_tet(&[0, 2, 3, 5, 7, 9, 11]),
            "pentatonic major" | "major pentatonic" => Self::twelve_tet(&[0, 2, 4, 7, 9]),
            "pentatonic minor" | "minor pentatonic" => Self::twelve_tet(&[0, 3, 5, 7, 10]),
            "blues" => Self::twelve_tet(&[0, 3, 5, 6, 7, 10]),
            "chromatic" => Self::twelve_tet(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]),
            "whole-tone" => Self::twelve_tet(&[0, 2, 4, 6, 8, 10]),
            "quarter-tone" => Self::equal_tempered(&(0..24).collect::<Vec<_>>(), 24.0, 2.0),
            "edo19" => Self::equal_tempered(&[0, 2, 4, 6, 8, 10, 12, 14, 16, 18], 19.0, 2.0),
            "bohlen-pierce" => Self::equal_tempered(
                &[0, 3, 6, 9, 12, 15, 18, 21, 24, 27, 30, 33, 36],
                39.0,
                3.0,
            ),
            _ => return None,
        };
        Some(mode)
    }
}

/// Semitone offset of a root note above A.
fn root_semitones(root: &str) -> Option<i32> {
    let semitones = match root {
        "A" => 0,
        "A#" | "Bb" => 1,
        "B" | "Cb" => 2,
        "B#" | "C" => 3,
        "C#" | "Db" => 4,
        "D" => 5,
        "D#" | "Eb" => 6,
        "E" | "Fb" => 7,
        "E#" | "F" => 8,
        "F#" | "Gb" => 9,
        "G" => 10,
        "G#" | "Ab" => 11,
        _ => return None,
    };
    Some(semitones)
}

// ---------------------------------------------------------------------------
// Scale
// ---------------------------------------------------------------------------

/// A rooted musical scale.  Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Scale {
    base_hz: f32,
    repeat_factor: f32,
    ratios: Vec<f32>,
}

impl Scale {
    /// Build a scale from its raw parts.
    ///
    /// # Errors
    ///
    /// [`ScaleError::InvalidParameters`] unless `base_hz > 0`,
    /// `repeat_factor > 1`, and `ratios` is non-empty, strictly ascending and
    /// inside `[1, repeat_factor)`.
    pub fn new(base_hz: f32, repeat_factor: f32, ratios: Vec<f32>) -> Result<Self, ScaleError> {
        if !(base_hz > 0.0) || !base_hz.is_finite() {
            return Err(ScaleError::InvalidParameters("base note must be positive"));
        }
        if !(repeat_factor > 1.0) || !repeat_factor.is_finite() {
            return Err(ScaleError::InvalidParameters(
                "repeat factor must be greater than 1",
            ));
        }
        if ratios.is_empty() {
            return Err(ScaleError::InvalidParameters("scale ratios cannot be empty"));
        }
        for (i, &ratio) in ratios.iter().enumerate() {
            if ratio < 1.0 {
                return Err(ScaleError::InvalidParameters("scale ratios must be at least 1"));
            }
            if ratio >= repeat_factor {
                return Err(ScaleError::InvalidParameters(
                    "scale ratios must be below the repeat factor",
                ));
            }
            if i > 0 && ratio <= ratios[i - 1] {
                return Err(ScaleError::InvalidParameters(
                    "scale ratios must be strictly ascending",
                ));
            }
        }
        Ok(Self {
            base_hz,
            repeat_factor,
            ratios,
        })
    }

    /// Parse a scale name using the default A4 reference of
    /// [`DEFAULT_A4_HZ`].
    pub fn from_name(name: &str) -> Result<Self, ScaleError> {
        Self::from_name_with_tuning(name, DEFAULT_A4_HZ)
    }

    /// Parse `"<root> <mode>"` (e.g. `"Bb major"`, `"C# minor pentatonic"`)
    /// or one of the atonal names `chromatic`, `whole-tone`, `quarter-tone`.
    ///
    /// `a4_hz` sets the pitch of A; the root lands in the octave at or above
    /// A4.
    pub fn from_name_with_tuning(name: &str, a4_hz: f32) -> Result<Self, ScaleError> {
        let name = name.trim();
        if ATONAL_SCALES.contains(&name) {
            return Self::from_mode_name(name, a4_hz);
        }

        let (root, mode_name) = name
            .split_once(' ')
            .ok_or_else(|| ScaleError::MalformedName(name.to_string()))?;
        let semitones =
            root_semitones(root).ok_or_else(|| ScaleError::UnknownRoot(root.to_string()))?;

        let base_hz = a4_hz * 2f32.powf(semitones as f32 / 12.0);
        Self::from_mode_name(mode_name.trim(), base_hz)
    }

    /// Build a scale from a mode name and an explicit root frequency.
    pub fn from_mode_name(mode_name: &str, base_hz: f32) -> Result<Self, ScaleError> {
        let mode =
            Mode::by_name(mode_name).ok_or_else(|| ScaleError::UnknownMode(mode_name.to_string()))?;
        Self::from_mode(mode, base_hz)
    }

    pub fn from_mode(mode: Mode, base_hz: f32) -> Result<Self, ScaleError> {
        Self::new(base_hz, mode.repeat_factor, mode.ratios)
    }

    /// Round `pitch_hz` to the nearest in-scale pitch, measured in log
    /// frequency.  Total over positive frequencies; non-positive or non-finite
    /// input is returned unchanged.
    pub fn closest_pitch(&self, pitch_hz: f32) -> f32 {
        if !(pitch_hz > 0.0) || !pitch_hz.is_finite() {
            return pitch_hz;
        }

        let log_repeat = self.repeat_factor.ln();
        let log_a = (pitch_hz / self.base_hz).ln();

        // pitch = base * repeat^n * r, with 1 <= r < repeat
        let n = (log_a / log_repeat).floor();
        let log_r = log_a - n * log_repeat;
        let r = log_r.exp();

        let upper_index = self
            .ratios
            .iter()
            .position(|&ratio| ratio > r)
            .unwrap_or(self.ratios.len());

        let lower = match upper_index {
            0 => self.ratios[self.ratios.len() - 1] / self.repeat_factor,
            i => self.ratios[i - 1],
        };
        let upper = if upper_index == self.ratios.len() {
            self.ratios[0] * self.repeat_factor
        } else {
            self.ratios[upper_index]
        };

        let closest = if log_r - lower.ln() < upper.ln() - log_r {
            lower
        } else {
            upper
        };

        closest * self.base_hz * self.repeat_factor.powf(n)
    }

    pub fn base_hz(&self) -> f32 {
        self.base_hz
    }

    pub fn repeat_factor(&self) -> f32 {
        self.repeat_factor
    }

    pub fn ratios(&self) -> &[f32] {
        &self.ratios
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(got: f32, want: f32, tol: f32) {
        assert!((got - want).abs() <= tol, "expected {want}, got {got}");
    }

    // ---- Construction ------------------------------------------------------

    #[test]
    fn new_accepts_valid_input() {
        let s = Scale::new(440.0, 2.0, vec![1.0, 1.2, 1.5]).unwrap();
        assert_eq!(s.base_hz(), 440.0);
        assert_eq!(s.repeat_factor(), 2.0);
        assert_eq!(s.ratios(), &[1.0, 1.2, 1.5]);
    }

    #[test]
    fn new_rejects_non_positive_base() {
        assert!(Scale::new(0.0, 2.0, vec![1.0]).is_err());
        assert!(Scale::new(-10.0, 2.0, vec![1.0]).is_err());
    }

    #[test]
    fn new_rejects_repeat_factor_not_above_one() {
        assert!(Scale::new(440.0, 1.0, vec![1.0]).is_err());
        assert!(Scale::new(440.0, 0.5, vec![1.0]).is_err());
    }

    #[test]
    fn new_rejects_unsorted_or_out_of_range_ratios() {
        assert!(Scale::new(440.0, 2.0, vec![1.2, 1.1]).is_err());
        assert!(Scale::new(440.0, 2.0, vec![0.9]).is_err());
        assert!(Scale::new(440.0, 2.0, vec![2.1]).is_err());
        assert!(Scale::new(440.0, 2.0, vec![]).is_err());
    }

    // ---- closest_pitch -----------------------------------------------------

    #[test]
    fn closest_pitch_within_base_octave() {
        let s = Scale::new(440.0, 2.0, vec![1.0, 1.25, 1.5, 1.75]).unwrap();
        assert_close(s.closest_pitch(440.0 * 1.52), 440.0 * 1.5, 1e-2);
    }

    #[test]
    fn closest_pitch_in_higher_octave() {
        let s = Scale::new(440.0, 2.0, vec![1.0, 1.5, 1.9]).unwrap();
        assert_close(s.closest_pitch(440.0 * 3.1), 440.0 * 3.0, 1e-2);
    }

    #[test]
    fn closest_pitch_rounds_up_to_next_repetition() {
        let s = Scale::new(440.0, 2.0, vec![1.0, 1.25, 1.5, 1.75]).unwrap();
        assert_close(s.closest_pitch(440.0 * 0.24), 440.0 * 0.25, 1e-2);
    }

    #[test]
    fn closest_pitch_rounds_down_when_root_not_in_scale() {
        let s = Scale::new(440.0, 2.0, vec![1.25, 1.5, 1.9]).unwrap();
        // 1.02 sits between 1.9/2 = 0.95 and 1.25; it is closer to 0.95.
        assert_close(s.closest_pitch(440.0 * 1.02), 440.0 * 0.95, 1e-2);
    }

    #[test]
    fn closest_pitch_is_identity_on_scale_notes() {
        let s = Scale::from_name_with_tuning("C major", 440.0).unwrap();
        for &ratio in s.ratios() {
            let pitch = s.base_hz() * ratio;
            assert_close(s.closest_pitch(pitch), pitch, 1e-2);
        }
    }

    #[test]
    fn closest_pitch_passes_through_non_positive_input() {
        let s = Scale::from_name("chromatic").unwrap();
        assert_eq!(s.closest_pitch(0.0), 0.0);
        assert_eq!(s.closest_pitch(-5.0), -5.0);
    }

    // ---- Names -------------------------------------------------------------

    #[test]
    fn c_major_rounds_440_to_default_a4() {
        // A is in C major; with A4 = 442 Hz the nearest pitch is 442 Hz.
        let s = Scale::from_name("C major").unwrap();
        assert_close(s.closest_pitch(440.0), DEFAULT_A4_HZ, 0.05);
    }

    #[test]
    fn root_sits_above_a4() {
        let s = Scale::from_name_with_tuning("C major", 440.0).unwrap();
        assert_close(s.base_hz(), 523.25, 0.01);
    }

    #[test]
    fn atonal_names_need_no_root() {
        let s = Scale::from_name("chromatic").unwrap();
        assert_eq!(s.ratios().len(), 12);
        assert_eq!(s.base_hz(), DEFAULT_A4_HZ);

        let q = Scale::from_name("quarter-tone").unwrap();
        assert_eq!(q.ratios().len(), 24);
    }

    #[test]
    fn multi_word_mode_names_parse() {
        let s = Scale::from_name("F# minor pentatonic").unwrap();
        assert_eq!(s.ratios().len(), 5);
        let h = Scale::from_name("D harmonic minor").unwrap();
        assert_eq!(h.ratios().len(), 7);
    }

    #[test]
    fn bohlen_pierce_repeats_at_tritave() {
        let s = Scale::from_name("C bohlen-pierce").unwrap();
        assert_eq!(s.repeat_factor(), 3.0);
        assert_eq!(s.ratios().len(), 13);
    }

    #[test]
    fn malformed_names_are_rejected() {
        assert_eq!(
            Scale::from_name("major"),
            Err(ScaleError::MalformedName("major".into()))
        );
        assert_eq!(
            Scale::from_name("H major"),
            Err(ScaleError::UnknownRoot("H".into()))
        );
        assert_eq!(
            Scale::from_name("C superlocrian"),
            Err(ScaleError::UnknownMode("superlocrian".into()))
        );
    }
}
