//! Lock-free pipeline counters.
//!
//! Each counter has one writer: the device callbacks bump `callbacks`,
//! `silenced`, `capture_dropped` and `device_errors`; the worker bumps
//! `processed`, `errors` and `playback_dropped`.  Readers take a
//! [`StatsSnapshot`]; fields are read independently, so a snapshot is
//! approximate and only meant for monitoring.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct PipelineStats {
    callbacks: AtomicU64,
    processed: AtomicU64,
    silenced: AtomicU64,
    errors: AtomicU64,
    capture_dropped: AtomicU64,
    playback_dropped: AtomicU64,
    device_errors: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_callback(&self) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_silenced(&self) {
        self.silenced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture_dropped(&self) {
        self.capture_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_playback_dropped(&self) {
        self.playback_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_error(&self) {
        self.device_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter.  Called by the controller at the start of a run.
    pub fn reset(&self) {
        for counter in [
            &self.callbacks,
            &self.processed,
            &self.silenced,
            &self.errors,
            &self.capture_dropped,
            &self.playback_dropped,
            &self.device_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Read all counters.  Queue depths are filled in by the caller that owns
    /// the queues.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            silenced: self.silenced.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            capture_dropped: self.capture_dropped.load(Ordering::Relaxed),
            playback_dropped: self.playback_dropped.load(Ordering::Relaxed),
            device_errors: self.device_errors.load(Ordering::Relaxed),
            capture_depth: 0,
            playback_depth: 0,
        }
    }
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Playback callbacks fired.
    pub callbacks: u64,
    /// Blocks corrected (or bypassed) and queued for playback.
    pub processed: u64,
    /// Playback callbacks that emitted any silence.
    pub silenced: u64,
    /// Blocks the worker failed to correct.
    pub errors: u64,
    /// Captured blocks discarded because the worker fell behind.
    pub capture_dropped: u64,
    /// Corrected blocks discarded because playback fell behind.
    pub playback_dropped: u64,
    /// Errors or xruns reported by the audio device.
    pub device_errors: u64,
    /// Blocks waiting for the worker.
    pub capture_depth: usize,
    /// Blocks waiting for playback.
    pub playback_depth: usize,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "callbacks={} processed={} silenced={} errors={} dropped(capture={} playback={}) \
             device_errors={} queued(capture={} playback={})",
            self.callbacks,
            self.processed,
            self.silenced,
            self.errors,
            self.capture_dropped,
            self.playback_dropped,
            self.device_errors,
            self.capture_depth,
            self.playback_depth,
        )
    }
}
