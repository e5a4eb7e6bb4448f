//! The device I/O boundary.
//!
//! An [`AudioBackend`] opens a full-duplex stream described by a
//! [`StreamSpec`] and wires it to the pipeline's queues through a
//! [`DeviceIo`].  The returned [`DeviceStream`] keeps the stream alive until
//! [`DeviceStream::close`] is called; after `close` returns no callback may
//! run again.
//!
//! Two backends exist: [`crate::audio::CpalBackend`] for real hardware and a
//! manually-driven backend used by the tests.

use std::sync::Arc;

use thiserror::Error;

use super::block::{AudioBlock, CapturedBlock, RawSample};
use super::callback::{CaptureEndpoint, DuplexCallback, PlaybackEndpoint};
use crate::pipeline::{PipelineStats, QueueConsumer, QueueProducer};

// ---------------------------------------------------------------------------
// StreamSpec
// ---------------------------------------------------------------------------

/// Parameters the device stream is opened with.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    /// Frames per block.
    pub block_size: usize,
    pub input_channels: u16,
    pub output_channels: u16,
    /// Input device name; `None` selects the host default.
    pub input_device: Option<String>,
    /// Output device name; `None` selects the host default.
    pub output_device: Option<String>,
}

impl Default for StreamSpec {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            block_size: 4096,
            input_channels: 1,
            output_channels: 1,
            input_device: None,
            output_device: None,
        }
    }
}

impl StreamSpec {
    /// Nominal time one block spans, in seconds.
    pub fn block_secs(&self) -> f32 {
        self.block_size as f32 / self.sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// CallbackStatus
// ---------------------------------------------------------------------------

/// Per-callback status flags reported by the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallbackStatus {
    pub input_overflow: bool,
    pub output_underflow: bool,
}

impl CallbackStatus {
    pub fn is_clean(&self) -> bool {
        !self.input_overflow && !self.output_underflow
    }
}

// ---------------------------------------------------------------------------
// DeviceIo
// ---------------------------------------------------------------------------

/// The pipeline's half of the queues, handed to a backend on open.
pub struct DeviceIo {
    /// Captured blocks go here (drop-oldest on overflow).
    pub capture: QueueProducer<CapturedBlock>,
    /// Corrected blocks come from here.
    pub playback: QueueConsumer<AudioBlock>,
    pub stats: Arc<PipelineStats>,
}

impl DeviceIo {
    /// Split into independent capture and playback endpoints, for backends
    /// that run input and output as separate streams.
    pub fn split<T: RawSample>(self, spec: &StreamSpec) -> (CaptureEndpoint<T>, PlaybackEndpoint) {
        let capture = CaptureEndpoint::new(
            self.capture,
            Arc::clone(&self.stats),
            spec.input_channels,
            spec.block_size,
        );
        let playback = PlaybackEndpoint::new(self.playback, self.stats, spec.output_channels);
        (capture, playback)
    }

    /// Combine into a single full-duplex `f32` callback.
    pub fn into_duplex(self, spec: &StreamSpec) -> DuplexCallback {
        let stats = Arc::clone(&self.stats);
        let (capture, playback) = self.split::<f32>(spec);
        DuplexCallback::new(capture, playback, stats)
    }
}

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

/// Errors that can occur while opening or running the device stream.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no input device found on the default audio host")]
    NoInputDevice,

    #[error("no output device found on the default audio host")]
    NoOutputDevice,

    #[error("failed to query default stream config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to enumerate devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to build stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("unsupported sample format {0:?}")]
    UnsupportedFormat(cpal::SampleFormat),

    #[error("failed to spawn audio thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("audio thread exited before the stream opened")]
    ThreadGone,

    #[error("{0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Opens device streams bound to the pipeline queues.
pub trait AudioBackend: Send + Sync {
    fn open(&self, spec: &StreamSpec, io: DeviceIo) -> Result<Box<dyn DeviceStream>, DeviceError>;
}

/// An open device stream.  Dropping it closes it as well.
pub trait DeviceStream: Send {
    /// Stop the stream.  Returns only once no further callback can run.
    fn close(self: Box<Self>);
}

// Compile-time assertion: both traits must be usable as trait objects.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn AudioBackend>, _: Box<dyn DeviceStream>) {}
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spec_block_duration() {
        let spec = StreamSpec::default();
        assert!((spec.block_secs() - 4096.0 / 44_100.0).abs() < 1e-6);
    }

    #[test]
    fn clean_status() {
        assert!(CallbackStatus::default().is_clean());
        let status = CallbackStatus {
            output_underflow: true,
            ..Default::default()
        };
        assert!(!status.is_clean());
    }

    #[test]
    fn device_error_messages() {
        assert_eq!(
            DeviceError::NoInputDevice.to_string(),
            "no input device found on the default audio host"
        );
        assert_eq!(DeviceError::Backend("boom".into()).to_string(), "boom");
    }
}
