//! Real-time pitch correction for a live microphone signal.
//!
//! ```text
//! capture callback ─▶ capture queue ─▶ worker (PitchCorrector) ─▶ playback queue ─▶ playback callback
//! ```
//!
//! [`pipeline::Pipeline`] owns configuration and lifecycle; [`audio`] holds
//! the device boundary; [`tuning`] the correction engine and the offline
//! batch path; [`config`] the on-disk settings.

pub mod audio;
pub mod config;
pub mod pipeline;
pub mod tuning;
