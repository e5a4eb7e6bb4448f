//! The real-time half of the pipeline.
//!
//! These types run inside device callbacks.  They never block, never log,
//! never return errors, and only allocate one block-sized buffer per
//! completed capture block.  Everything they observe goes into
//! [`PipelineStats`].
//!
//! ```text
//! input frames ──▶ CaptureEndpoint ──(exact block_size frames)──▶ capture queue
//! output frames ◀── PlaybackEndpoint ◀──(blocks, or silence)──── playback queue
//! ```
//!
//! Hosts are free to call back with any number of frames.  The capture side
//! reassembles exact blocks and the playback side streams each block across
//! as many callbacks as it takes.

use std::sync::Arc;

use cpal::{FromSample, Sample};

use super::block::{AudioBlock, CapturedBlock, RawSample};
use super::device::CallbackStatus;
use crate::pipeline::{PipelineStats, PushOutcome, QueueConsumer, QueueProducer};

// ---------------------------------------------------------------------------
// CaptureEndpoint
// ---------------------------------------------------------------------------

pub struct CaptureEndpoint<T: RawSample> {
    queue: QueueProducer<CapturedBlock>,
    stats: Arc<PipelineStats>,
    channels: u16,
    /// Interleaved samples per block (`block_size * channels`).
    block_len: usize,
    pending: Vec<T>,
}

impl<T: RawSample> CaptureEndpoint<T> {
    pub fn new(
        queue: QueueProducer<CapturedBlock>,
        stats: Arc<PipelineStats>,
        channels: u16,
        block_size: usize,
    ) -> Self {
        let channels = channels.max(1);
        let block_len = block_size.max(1) * channels as usize;
        Self {
            queue,
            stats,
            channels,
            block_len,
            pending: Vec::with_capacity(block_len),
        }
    }

    /// Copy interleaved input frames; every completed block is queued.
    pub fn push_interleaved(&mut self, mut data: &[T]) {
        while !data.is_empty() {
            let take = (self.block_len - self.pending.len()).min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.pending.len() == self.block_len {
                let full = std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_len));
                let block = CapturedBlock::new(T::into_buffer(full), self.channels);
                match self.queue.push_evicting(block) {
                    PushOutcome::Queued => {}
                    PushOutcome::ReplacedOldest | PushOutcome::Rejected => {
                        self.stats.record_capture_dropped()
                    }
                }
            }
        }
    }

    /// Frames buffered toward the next block.
    pub fn pending_frames(&self) -> usize {
        self.pending.len() / self.channels as usize
    }
}

// ---------------------------------------------------------------------------
// PlaybackEndpoint
// ---------------------------------------------------------------------------

pub struct PlaybackEndpoint {
    queue: QueueConsumer<AudioBlock>,
    stats: Arc<PipelineStats>,
    channels: u16,
    current: AudioBlock,
    cursor: usize,
}

impl PlaybackEndpoint {
    pub fn new(queue: QueueConsumer<AudioBlock>, stats: Arc<PipelineStats>, channels: u16) -> Self {
        Self {
            queue,
            stats,
            channels: channels.max(1),
            current: Vec::new(),
            cursor: 0,
        }
    }

    /// Fill `output` (interleaved) from the playback queue.  Each mono sample
    /// is written to every channel of its frame.  Frames with no corrected
    /// audio available are silent.
    pub fn fill<T>(&mut self, output: &mut [T])
    where
        T: Sample + FromSample<f32>,
    {
        self.stats.record_callback();

        let mut silenced = false;
        for frame in output.chunks_mut(self.channels as usize) {
            let value = match self.next_sample() {
                Some(sample) => sample.to_sample::<T>(),
                None => {
                    silenced = true;
                    T::EQUILIBRIUM
                }
            };
            frame.fill(value);
        }

        if silenced {
            self.stats.record_silenced();
        }
    }

    fn next_sample(&mut self) -> Option<f32> {
        while self.cursor >= self.current.len() {
            self.current = self.queue.try_pop()?;
            self.cursor = 0;
        }
        let sample = self.current[self.cursor];
        self.cursor += 1;
        Some(sample)
    }
}

// ---------------------------------------------------------------------------
// DuplexCallback
// ---------------------------------------------------------------------------

/// Capture and playback driven from one full-duplex `f32` callback.
pub struct DuplexCallback {
    capture: CaptureEndpoint<f32>,
    playback: PlaybackEndpoint,
    stats: Arc<PipelineStats>,
}

impl DuplexCallback {
    pub fn new(
        capture: CaptureEndpoint<f32>,
        playback: PlaybackEndpoint,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            capture,
            playback,
            stats,
        }
    }

    /// One device period: consume `input`, produce `output`.
    pub fn process(&mut self, input: &[f32], output: &mut [f32], status: CallbackStatus) {
        if !status.is_clean() {
            self.stats.record_device_error();
        }
        self.capture.push_interleaved(input);
        self.playback.fill(output);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
