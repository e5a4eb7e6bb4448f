//! The processing worker: capture queue → correction → playback queue.
//!
//! Runs on its own `autotune-worker` thread for the lifetime of one run.
//!
//! ```text
//! loop while Running:
//!   pop_timeout(poll) ──timeout──▶ re-check state
//!        │
//!        ▼
//!   to_mono → length check → bypass? ──yes──▶ forward unchanged
//!                                 └──no──▶ corrector.correct
//!        │
//!        ├─ Ok  → processed += 1, try_push (full → playback_dropped += 1)
//!        └─ Err → errors += 1, warn, next block
//!
//! on Stopping: the in-flight block finishes, the queued backlog is discarded
//! ```
//!
//! Failures are per block; nothing the corrector does can end the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::{rms, AudioBlock, CapturedBlock};
use crate::tuning::{CorrectionError, CorrectionTarget, PitchCorrector};

use super::queue::{PopError, QueueConsumer, QueueProducer};
use super::state::{RunState, SharedRunState};
use super::stats::PipelineStats;

/// Input RMS is traced once every this many blocks.
const RMS_TRACE_EVERY: u64 = 10;

/// Everything the worker needs, moved onto its thread.
pub struct WorkerContext {
    pub capture: QueueConsumer<CapturedBlock>,
    pub playback: QueueProducer<AudioBlock>,
    pub corrector: Arc<dyn PitchCorrector>,
    pub target: CorrectionTarget,
    pub sample_rate: u32,
    pub block_size: usize,
    /// Longest a single queue wait may take before the state is re-checked.
    pub poll: Duration,
    pub state: SharedRunState,
    pub bypass: Arc<AtomicBool>,
    pub stats: Arc<PipelineStats>,
}

/// Start the worker thread.
pub fn spawn_worker(ctx: WorkerContext) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("autotune-worker".into())
        .spawn(move || ctx.run())
}

impl WorkerContext {
    fn run(self) {
        log::debug!(
            "worker: started ({} target, {} Hz, block {})",
            self.target.label(),
            self.sample_rate,
            self.block_size
        );

        let mut seen: u64 = 0;
        while self.state.get() == RunState::Running {
            match self.capture.pop_timeout(self.poll) {
                Ok(block) => {
                    seen += 1;
                    self.process(block, seen);
                }
                Err(PopError::Timeout) => {}
                Err(PopError::Disconnected) => {
                    log::debug!("worker: capture side closed");
                    break;
                }
            }
        }

        let discarded = self.capture.drain();
        if discarded > 0 {
            log::debug!("worker: discarded {discarded} queued block(s) on stop");
        }
        log::debug!("worker: exiting after {seen} block(s)");
    }

    fn process(&self, block: CapturedBlock, seen: u64) {
        let mono = block.to_mono();
        if seen % RMS_TRACE_EVERY == 0 {
            log::trace!("worker: block {seen} input rms {:.5}", rms(&mono));
        }

        match self.correct(mono) {
            Ok(corrected) => {
                self.stats.record_processed();
                if self.playback.try_push(corrected).is_err() {
                    self.stats.record_playback_dropped();
                }
            }
            Err(e) => {
                self.stats.record_error();
                log::warn!("worker: block {seen} skipped: {e}");
            }
        }
    }

    fn correct(&self, mono: AudioBlock) -> Result<AudioBlock, CorrectionError> {
        if mono.len() != self.block_size {
            return Err(CorrectionError::LengthMismatch {
                expected: self.block_size,
                got: mono.len(),
            });
        }
        if self.bypass.load(Ordering::Relaxed) {
            return Ok(mono);
        }

        let corrected = self.corrector.correct(&mono, self.sample_rate, &self.target)?;
        if corrected.len() != mono.len() {
            return Err(CorrectionError::LengthMismatch {
                expected: mono.len(),
                got: corrected.len(),
            });
        }
        Ok(corrected)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::queue::handoff_queue;
    use crate::tuning::MockCorrector;
    use std::time::Instant;

    struct Harness {
        capture: QueueProducer<CapturedBlock>,
        playback: QueueConsumer<AudioBlock>,
        state: SharedRunState,
        stats: Arc<PipelineStats>,
        bypass: Arc<AtomicBool>,
        handle: JoinHandle<()>,
    }

    fn start(corrector: MockCorrector, block_size: usize, playback_capacity: usize) -> Harness {
        let (capture_tx, capture_rx) = handoff_queue(8);
        let (playback_tx, playback_rx) = handoff_queue(playback_capacity);
        let state = SharedRunState::new();
        state.set(RunState::Running);
        let stats = Arc::new(PipelineStats::new());
        let bypass = Arc::new(AtomicBool::new(false));

        let handle = spawn_worker(WorkerContext {
            capture: capture_rx,
            playback: playback_tx,
            corrector: Arc::new(corrector),
            target: CorrectionTarget::Note(440.0),
            sample_rate: 44_100,
            block_size,
            poll: Duration::from_millis(10),
            state: state.clone(),
            bypass: Arc::clone(&bypass),
            stats: Arc::clone(&stats),
        })
        .expect("spawn worker");

        Harness {
            capture: capture_tx,
            playback: playback_rx,
            state,
            stats,
            bypass,
            handle,
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    impl Harness {
        fn stop(self) -> Arc<PipelineStats> {
            self.state.set(RunState::Stopping);
            self.handle.join().expect("worker panicked");
            self.stats
        }
    }

    #[test]
    fn blocks_come_out_in_order() {
        let h = start(MockCorrector::Gain(2.0), 2, 8);
        for i in 1..=3 {
            let v = i as f32 / 10.0;
            h.capture.try_push(CapturedBlock::mono(vec![v, v])).unwrap();
        }
        assert!(wait_until(|| h.playback.len() == 3));
        let out: Vec<AudioBlock> = std::iter::from_fn(|| h.playback.try_pop()).collect();
        assert_eq!(out, vec![vec![0.2, 0.2], vec![0.4, 0.4], vec![0.6, 0.6]]);
        let stats = h.stop();
        assert_eq!(stats.snapshot().processed, 3);
    }

    #[test]
    fn stereo_input_is_downmixed_before_correction() {
        let h = start(MockCorrector::Identity, 2, 4);
        let block = CapturedBlock::new(crate::audio::SampleBuffer::F32(vec![0.2, 0.4, 0.6, 0.8]), 2);
        h.capture.try_push(block).unwrap();
        assert!(wait_until(|| h.playback.len() == 1));
        let out = h.playback.try_pop().unwrap();
        assert!((out[0] - 0.3).abs() < 1e-6 && (out[1] - 0.7).abs() < 1e-6);
        h.stop();
    }

    #[test]
    fn failures_are_counted_and_the_loop_continues() {
        let h = start(MockCorrector::FailNegative, 2, 4);
        h.capture.try_push(CapturedBlock::mono(vec![-0.5, 0.0])).unwrap();
        h.capture.try_push(CapturedBlock::mono(vec![0.5, 0.0])).unwrap();
        assert!(wait_until(|| h.playback.len() == 1));
        assert_eq!(h.playback.try_pop(), Some(vec![0.5, 0.0]));
        let snap = h.stop().snapshot();
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.processed, 1);
    }

    #[test]
    fn wrong_length_block_is_an_error() {
        let h = start(MockCorrector::Identity, 4, 4);
        h.capture.try_push(CapturedBlock::mono(vec![0.1; 3])).unwrap();
        assert!(wait_until(|| h.stats.snapshot().errors == 1));
        assert!(h.playback.is_empty());
        h.stop();
    }

    #[test]
    fn bypass_skips_the_corrector() {
        let h = start(MockCorrector::Fail, 2, 4);
        h.bypass.store(true, Ordering::Relaxed);
        h.capture.try_push(CapturedBlock::mono(vec![0.3, -0.3])).unwrap();
        assert!(wait_until(|| h.playback.len() == 1));
        assert_eq!(h.playback.try_pop(), Some(vec![0.3, -0.3]));
        assert_eq!(h.stop().snapshot().errors, 0);
    }

    #[test]
    fn full_playback_queue_drops_newest() {
        let h = start(MockCorrector::Identity, 1, 1);
        h.capture.try_push(CapturedBlock::mono(vec![0.1])).unwrap();
        h.capture.try_push(CapturedBlock::mono(vec![0.2])).unwrap();
        assert!(wait_until(|| h.stats.snapshot().playback_dropped == 1));
        assert_eq!(h.playback.try_pop(), Some(vec![0.1]));
        h.stop();
    }

    #[test]
    fn stop_discards_backlog_after_in_flight_block() {
        let h = start(MockCorrector::Stall(Duration::from_millis(100)), 1, 8);
        for _ in 0..4 {
            h.capture.try_push(CapturedBlock::mono(vec![0.1])).unwrap();
        }
        assert!(wait_until(|| h.capture.len() < 4));
        let started = Instant::now();
        let stats = h.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(stats.snapshot().processed, 1);
    }

    #[test]
    fn exits_when_capture_side_disconnects() {
        let h = start(MockCorrector::Identity, 1, 4);
        let Harness {
            capture, handle, ..
        } = h;
        drop(capture);
        handle.join().expect("worker exits on disconnect");
    }
}
