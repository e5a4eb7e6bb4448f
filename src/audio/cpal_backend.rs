//! Real hardware backend built on `cpal`.
//!
//! `cpal::Stream` is not `Send` on every platform, so both streams are built
//! and owned by a dedicated `autotune-audio` thread.  [`CpalBackend::open`]
//! blocks until that thread reports whether the streams started; the
//! returned [`CpalStream`] asks the thread to drop them and joins it on
//! close.
//!
//! ```text
//! open() ──spawn──▶ autotune-audio thread
//!                     ├─ build input stream  (CaptureEndpoint<T>)
//!                     ├─ build output stream (PlaybackEndpoint)
//!                     ├─ play both, report Ok/Err ──▶ open() returns
//!                     └─ park until shutdown, then drop streams
//! ```

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};

use super::block::RawSample;
use super::callback::{CaptureEndpoint, PlaybackEndpoint};
use super::device::{AudioBackend, DeviceError, DeviceIo, DeviceStream, StreamSpec};
use crate::pipeline::PipelineStats;

// ---------------------------------------------------------------------------
// CpalBackend
// ---------------------------------------------------------------------------

/// Opens separate input and output streams on the default `cpal` host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn open(&self, spec: &StreamSpec, io: DeviceIo) -> Result<Box<dyn DeviceStream>, DeviceError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), DeviceError>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let spec = spec.clone();

        let thread = thread::Builder::new()
            .name("autotune-audio".into())
            .spawn(move || audio_thread_main(spec, io, ready_tx, shutdown_rx))
            .map_err(DeviceError::ThreadSpawn)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalStream {
                shutdown: Some(shutdown_tx),
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(DeviceError::ThreadGone)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CpalStream
// ---------------------------------------------------------------------------

/// Handle to the running audio thread.
pub struct CpalStream {
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceStream for CpalStream {
    fn close(self: Box<Self>) {
        // Drop does the work.
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("audio: audio thread panicked");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Audio thread
// ---------------------------------------------------------------------------

fn audio_thread_main(
    spec: StreamSpec,
    io: DeviceIo,
    ready_tx: mpsc::Sender<Result<(), DeviceError>>,
    shutdown_rx: mpsc::Receiver<()>,
) {
    let streams = match open_streams(&spec, io) {
        Ok(streams) => streams,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    // Either a shutdown message or a dropped handle ends the stream.
    let _ = shutdown_rx.recv();
    drop(streams);
    log::debug!("audio: streams closed");
}

fn open_streams(
    spec: &StreamSpec,
    io: DeviceIo,
) -> Result<(cpal::Stream, cpal::Stream), DeviceError> {
    let host = cpal::default_host();

    let input = find_device(
        host.input_devices()?,
        spec.input_device.as_deref(),
        || host.default_input_device(),
    )
    .ok_or(DeviceError::NoInputDevice)?;
    let output = find_device(
        host.output_devices()?,
        spec.output_device.as_deref(),
        || host.default_output_device(),
    )
    .ok_or(DeviceError::NoOutputDevice)?;

    let input_supported = input.default_input_config()?;
    let output_supported = output.default_output_config()?;
    let input_config = stream_config(spec, spec.input_channels, input_supported.buffer_size());
    let output_config = stream_config(spec, spec.output_channels, output_supported.buffer_size());

    log::info!(
        "audio: input '{}' ({:?}), output '{}' ({:?}), {} Hz, block {} frames",
        input.name().unwrap_or_else(|_| "unknown".into()),
        input_supported.sample_format(),
        output.name().unwrap_or_else(|_| "unknown".into()),
        output_supported.sample_format(),
        spec.sample_rate,
        spec.block_size,
    );

    let stats = Arc::clone(&io.stats);
    let input_format = input_supported.sample_format();
    let output_format = output_supported.sample_format();

    // The endpoint sample type follows the device format.
    let (input_stream, playback) = match input_format {
        SampleFormat::F32 => {
            let (capture, playback) = io.split::<f32>(spec);
            (build_capture(&input, &input_config, capture, &stats)?, playback)
        }
        SampleFormat::I16 => {
            let (capture, playback) = io.split::<i16>(spec);
            (build_capture(&input, &input_config, capture, &stats)?, playback)
        }
        SampleFormat::U16 => {
            let (capture, playback) = io.split::<u16>(spec);
            (build_capture(&input, &input_config, capture, &stats)?, playback)
        }
        other => return Err(DeviceError::UnsupportedFormat(other)),
    };

    let output_stream = match output_format {
        SampleFormat::F32 => build_playback::<f32>(&output, &output_config, playback, &stats)?,
        SampleFormat::I16 => build_playback::<i16>(&output, &output_config, playback, &stats)?,
        SampleFormat::U16 => build_playback::<u16>(&output, &output_config, playback, &stats)?,
        other => return Err(DeviceError::UnsupportedFormat(other)),
    };

    // Start output first so the first corrected block has somewhere to go.
    output_stream.play()?;
    input_stream.play()?;
    Ok((input_stream, output_stream))
}

/// The named device if it exists, otherwise the host default.
fn find_device<I, F>(devices: I, name: Option<&str>, default: F) -> Option<cpal::Device>
where
    I: Iterator<Item = cpal::Device>,
    F: FnOnce() -> Option<cpal::Device>,
{
    if let Some(wanted) = name {
        let mut devices = devices;
        if let Some(device) = devices.find(|d| d.name().map(|n| n == wanted).unwrap_or(false)) {
            return Some(device);
        }
        log::warn!("audio: device '{wanted}' not found, using default");
    }
    default()
}

fn stream_config(
    spec: &StreamSpec,
    channels: u16,
    supported: &cpal::SupportedBufferSize,
) -> cpal::StreamConfig {
    let frames = spec.block_size as u32;
    let buffer_size = match supported {
        cpal::SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&frames) => {
            cpal::BufferSize::Fixed(frames)
        }
        _ => cpal::BufferSize::Default,
    };
    cpal::StreamConfig {
        channels: channels.max(1),
        sample_rate: cpal::SampleRate(spec.sample_rate),
        buffer_size,
    }
}

fn error_callback(stats: &Arc<PipelineStats>) -> impl FnMut(cpal::StreamError) + Send + 'static {
    let stats = Arc::clone(stats);
    move |err| {
        log::error!("audio: cpal stream error: {err}");
        stats.record_device_error();
    }
}

fn build_capture<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut endpoint: CaptureEndpoint<T>,
    stats: &Arc<PipelineStats>,
) -> Result<cpal::Stream, DeviceError>
where
    T: RawSample + SizedSample,
{
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| endpoint.push_interleaved(data),
        error_callback(stats),
        None,
    )?;
    Ok(stream)
}

fn build_playback<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut endpoint: PlaybackEndpoint,
    stats: &Arc<PipelineStats>,
) -> Result<cpal::Stream, DeviceError>
where
    T: SizedSample + FromSample<f32>,
{
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| endpoint.fill(data),
        error_callback(stats),
        None,
    )?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_buffer_when_block_fits_device_range() {
        let spec = StreamSpec::default();
        let config = stream_config(
            &spec,
            2,
            &cpal::SupportedBufferSize::Range { min: 64, max: 8192 },
        );
        assert_eq!(config.buffer_size, cpal::BufferSize::Fixed(4096));
        assert_eq!(config.channels, 2);
        assert_eq!(config.sample_rate, cpal::SampleRate(44_100));
    }

    #[test]
    fn default_buffer_when_block_out_of_range() {
        let spec = StreamSpec {
            block_size: 16_384,
            ..StreamSpec::default()
        };
        let config = stream_config(
            &spec,
            1,
            &cpal::SupportedBufferSize::Range { min: 64, max: 8192 },
        );
        assert_eq!(config.buffer_size, cpal::BufferSize::Default);

        let unknown = stream_config(&spec, 0, &cpal::SupportedBufferSize::Unknown);
        assert_eq!(unknown.buffer_size, cpal::BufferSize::Default);
        assert_eq!(unknown.channels, 1);
    }

    #[test]
    fn backend_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CpalBackend>();
    }
}
