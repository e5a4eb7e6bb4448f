//! Pipeline controller: configuration, lifecycle and stats.
//!
//! [`Pipeline`] owns the run state, the queues (for the length of a run),
//! the worker thread and the device stream.
//!
//! # Lifecycle
//!
//! ```text
//! configure(cfg)  validate, build the CorrectionTarget          (Idle only)
//! start()         queues → worker thread → device stream         Idle → Running
//! stop()          close device → join worker                     Running → Stopping → Idle
//! ```
//!
//! The device is opened after the worker exists and closed before the worker
//! is joined, so no callback ever pushes into a queue nobody drains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::{AudioBackend, AudioBlock, CapturedBlock, DeviceError, DeviceIo, DeviceStream, StreamSpec};
use crate::tuning::{CorrectionTarget, PitchCorrector, Scale, ScaleError, DEFAULT_A4_HZ};

use super::queue::{handoff_queue, QueueGauge};
use super::state::{RunState, SharedRunState};
use super::stats::{PipelineStats, StatsSnapshot};
use super::worker::{spawn_worker, WorkerContext};

// ---------------------------------------------------------------------------
// TuningMode
// ---------------------------------------------------------------------------

/// What the live signal is corrected toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TuningMode {
    /// Nearest pitch of a named scale.
    #[default]
    Scale,
    /// One fixed frequency.
    Note,
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Everything [`Pipeline::configure`] needs.
///
/// Exactly one of `scale_name` / `target_note_hz` must be set, and it must
/// match `mode`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    /// Frames per block.
    pub block_size: usize,
    pub mode: TuningMode,
    /// e.g. `"C major"`; used when `mode == Scale`.
    pub scale_name: Option<String>,
    /// Target in Hz; used when `mode == Note`.
    pub target_note_hz: Option<f32>,
    /// Reference pitch for scale roots.
    pub a4_hz: f32,
    pub input_channels: u16,
    pub output_channels: u16,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub capture_queue_blocks: usize,
    pub playback_queue_blocks: usize,
    /// Upper bound on one worker wait; also bounds how long stop waits for
    /// an idle worker.
    pub worker_poll: Duration,
    /// Start with correction bypassed (loopback).
    pub bypass: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            block_size: 4096,
            mode: TuningMode::Scale,
            scale_name: Some("C major".into()),
            target_note_hz: None,
            a4_hz: DEFAULT_A4_HZ,
            input_channels: 1,
            output_channels: 1,
            input_device: None,
            output_device: None,
            capture_queue_blocks: 4,
            playback_queue_blocks: 4,
            worker_poll: Duration::from_millis(100),
            bypass: false,
        }
    }
}

impl PipelineConfig {
    /// Default settings tuned to `scale_name`.
    pub fn scale(scale_name: impl Into<String>) -> Self {
        Self {
            mode: TuningMode::Scale,
            scale_name: Some(scale_name.into()),
            target_note_hz: None,
            ..Self::default()
        }
    }

    /// Default settings pulling everything to `target_hz`.
    pub fn note(target_hz: f32) -> Self {
        Self {
            mode: TuningMode::Note,
            scale_name: None,
            target_note_hz: Some(target_hz),
            ..Self::default()
        }
    }

    fn stream_spec(&self) -> StreamSpec {
        StreamSpec {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            input_channels: self.input_channels,
            output_channels: self.output_channels,
            input_device: self.input_device.clone(),
            output_device: self.output_device.clone(),
        }
    }

    /// Check every field and resolve the correction target.
    fn validate(&self) -> Result<CorrectionTarget, PipelineError> {
        let invalid = |msg: &str| Err(PipelineError::InvalidConfig(msg.to_string()));

        if self.sample_rate == 0 {
            return invalid("sample_rate must be > 0");
        }
        if self.block_size == 0 {
            return invalid("block_size must be > 0");
        }
        if self.input_channels == 0 || self.output_channels == 0 {
            return invalid("channel counts must be > 0");
        }
        if self.capture_queue_blocks == 0 || self.playback_queue_blocks == 0 {
            return invalid("queue capacities must be > 0");
        }
        if self.worker_poll.is_zero() {
            return invalid("worker_poll must be > 0");
        }
        if !(self.a4_hz > 0.0) || !self.a4_hz.is_finite() {
            return invalid("a4_hz must be a positive frequency");
        }

        match (self.mode, self.scale_name.as_deref(), self.target_note_hz) {
            (_, Some(_), Some(_)) => invalid("both a scale and a target note were given"),
            (_, None, None) => invalid("no scale or target note given"),
            (TuningMode::Scale, Some(name), None) => {
                let scale = Scale::from_name_with_tuning(name, self.a4_hz)?;
                Ok(CorrectionTarget::Scale(Arc::new(scale)))
            }
            (TuningMode::Note, None, Some(hz)) => {
                if hz > 0.0 && hz.is_finite() {
                    Ok(CorrectionTarget::Note(hz))
                } else {
                    invalid("target_note_hz must be a positive frequency")
                }
            }
            (TuningMode::Scale, None, Some(_)) => invalid("scale mode needs a scale name"),
            (TuningMode::Note, Some(_), None) => invalid("note mode needs a target frequency"),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown scale: {0}")]
    UnknownScale(#[from] ScaleError),

    #[error("pipeline is already running")]
    AlreadyRunning,

    #[error("pipeline has not been configured")]
    NotConfigured,

    #[error("audio device error: {0}")]
    Device(#[from] DeviceError),

    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A validated configuration.
#[derive(Clone)]
struct Configured {
    config: PipelineConfig,
    spec: StreamSpec,
    target: CorrectionTarget,
}

/// Resources that exist only while running.
struct Session {
    stream: Box<dyn DeviceStream>,
    worker: JoinHandle<()>,
}

struct Gauges {
    capture: QueueGauge<CapturedBlock>,
    playback: QueueGauge<AudioBlock>,
}

#[derive(Default)]
struct Inner {
    configured: Option<Configured>,
    session: Option<Session>,
}

/// The real-time pitch-correction pipeline.
///
/// `Pipeline` is `Send + Sync`; share it behind an `Arc` to call
/// [`stop`](Self::stop) or [`stats`](Self::stats) from another thread.
/// Dropping it stops it.
pub struct Pipeline {
    backend: Arc<dyn AudioBackend>,
    corrector: Arc<dyn PitchCorrector>,
    state: SharedRunState,
    stats: Arc<PipelineStats>,
    bypass: Arc<AtomicBool>,
    inner: Mutex<Inner>,
    gauges: Mutex<Option<Gauges>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Pipeline {
    pub fn new(backend: Arc<dyn AudioBackend>, corrector: Arc<dyn PitchCorrector>) -> Self {
        Self {
            backend,
            corrector,
            state: SharedRunState::new(),
            stats: Arc::new(PipelineStats::new()),
            bypass: Arc::new(AtomicBool::new(false)),
            inner: Mutex::new(Inner::default()),
            gauges: Mutex::new(None),
        }
    }

    /// Validate and store `config`.  Replaces any earlier configuration.
    ///
    /// # Errors
    ///
    /// [`PipelineError::AlreadyRunning`] unless idle,
    /// [`PipelineError::InvalidConfig`] for out-of-range fields or an
    /// inconsistent mode/target pair, [`PipelineError::UnknownScale`] when
    /// the scale name does not parse.  A failed call leaves the previous
    /// configuration in place.
    pub fn configure(&self, config: PipelineConfig) -> Result<(), PipelineError> {
        let mut inner = lock(&self.inner);
        if inner.session.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }

        let target = config.validate()?;
        log::info!(
            "pipeline: configured {} Hz, block {} frames, {} target",
            config.sample_rate,
            config.block_size,
            target.label()
        );
        self.bypass.store(config.bypass, Ordering::Relaxed);
        inner.configured = Some(Configured {
            spec: config.stream_spec(),
            config,
            target,
        });
        Ok(())
    }

    /// Create the queues, start the worker, then open the device.
    ///
    /// On a device failure the worker is stopped again and the pipeline
    /// stays idle.
    pub fn start(&self) -> Result<(), PipelineError> {
        let mut inner = lock(&self.inner);
        if inner.session.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }
        let Configured {
            config,
            spec,
            target,
        } = inner.configured.clone().ok_or(PipelineError::NotConfigured)?;

        let (capture_tx, capture_rx) = handoff_queue::<CapturedBlock>(config.capture_queue_blocks);
        let (playback_tx, playback_rx) = handoff_queue::<AudioBlock>(config.playback_queue_blocks);
        let gauges = Gauges {
            capture: capture_rx.gauge(),
            playback: playback_rx.gauge(),
        };

        self.state
            .transition(RunState::Idle, RunState::Running)
            .map_err(|_| PipelineError::AlreadyRunning)?;
        self.stats.reset();

        let worker = spawn_worker(WorkerContext {
            capture: capture_rx,
            playback: playback_tx,
            corrector: Arc::clone(&self.corrector),
            target,
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            poll: config.worker_poll,
            state: self.state.clone(),
            bypass: Arc::clone(&self.bypass),
            stats: Arc::clone(&self.stats),
        })
        .map_err(|e| {
            self.state.set(RunState::Idle);
            PipelineError::WorkerSpawn(e)
        })?;

        let io = DeviceIo {
            capture: capture_tx,
            playback: playback_rx,
            stats: Arc::clone(&self.stats),
        };
        let stream = match self.backend.open(&spec, io) {
            Ok(stream) => stream,
            Err(e) => {
                self.state.set(RunState::Stopping);
                if worker.join().is_err() {
                    log::error!("pipeline: worker thread panicked");
                }
                self.state.set(RunState::Idle);
                log::error!("pipeline: failed to open audio device: {e}");
                return Err(e.into());
            }
        };

        *lock(&self.gauges) = Some(gauges);
        inner.session = Some(Session { stream, worker });

        let block_ms = spec.block_secs() * 1000.0;
        let buffered = config.capture_queue_blocks + config.playback_queue_blocks;
        log::info!(
            "pipeline: running; block period {block_ms:.1} ms, minimum latency ~{:.1} ms, \
             worst case ~{:.1} ms with {buffered} blocks queued",
            2.0 * block_ms,
            (2 + buffered) as f32 * block_ms,
        );
        Ok(())
    }

    /// Close the device, then signal the worker to drain and join it,
    /// then return to idle.  Calling it while idle does nothing.
    ///
    /// The worker keeps running until the device is closed, so no block
    /// captured before the close is left unread.
    pub fn stop(&self) {
        let mut inner = lock(&self.inner);
        let Some(session) = inner.session.take() else {
            return;
        };

        log::info!("pipeline: stopping");
        session.stream.close();
        if let Err(seen) = self.state.transition(RunState::Running, RunState::Stopping) {
            log::warn!("pipeline: expected running on stop, found {}", seen.label());
            self.state.set(RunState::Stopping);
        }
        if session.worker.join().is_err() {
            log::error!("pipeline: worker thread panicked");
        }

        let summary = self.stats();
        *lock(&self.gauges) = None;
        self.state.set(RunState::Idle);
        log::info!("pipeline: stopped ({summary})");
    }

    /// Current counters plus queue depths.
    pub fn stats(&self) -> StatsSnapshot {
        let mut snapshot = self.stats.snapshot();
        if let Some(gauges) = lock(&self.gauges).as_ref() {
            snapshot.capture_depth = gauges.capture.len();
            snapshot.playback_depth = gauges.playback.len();
        }
        snapshot
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Forward audio unchanged instead of correcting it.  Takes effect from
    /// the next block.
    pub fn set_bypass(&self, bypass: bool) {
        self.bypass.store(bypass, Ordering::Relaxed);
        log::info!("pipeline: bypass {}", if bypass { "on" } else { "off" });
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass.load(Ordering::Relaxed)
    }

    /// The configuration accepted by the last successful `configure`.
    pub fn config(&self) -> Option<PipelineConfig> {
        lock(&self.inner).configured.as_ref().map(|c| c.config.clone())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
