//! Audio device boundary: block types, the real-time callback endpoints and
//! the backends that drive them.
//!
//! # Data path
//!
//! ```text
//! input device ─▶ cpal callback ─▶ CaptureEndpoint ─▶ CapturedBlock ─▶ capture queue
//! output device ◀─ cpal callback ◀─ PlaybackEndpoint ◀─ AudioBlock ◀─ playback queue
//! ```
//!
//! The queues themselves live in [`crate::pipeline`]; this module only sees
//! their producer/consumer halves through a [`DeviceIo`].

pub mod block;
pub mod callback;
pub mod cpal_backend;
pub mod device;

#[cfg(test)]
pub mod testing;

pub use block::{downmix_to_mono, rms, AudioBlock, CapturedBlock, RawSample, SampleBuffer};
pub use callback::{CaptureEndpoint, DuplexCallback, PlaybackEndpoint};
pub use cpal_backend::{CpalBackend, CpalStream};
pub use device::{AudioBackend, CallbackStatus, DeviceError, DeviceIo, DeviceStream, StreamSpec};
