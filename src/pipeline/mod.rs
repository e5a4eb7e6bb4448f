//! The block-streaming pipeline between the device callbacks and the
//! correction engine.
//!
//! # Architecture
//!
//! ```text
//!  capture callback                                       playback callback
//!        │ push_evicting (drop oldest)                           ▲ try_pop (empty → silence)
//!        ▼                                                       │
//!  [ capture queue ] ──pop_timeout──▶ worker thread ──try_push──▶ [ playback queue ]
//!                                       │  (full → drop newest)
//!                                       ▼
//!                              PitchCorrector::correct
//!
//!  Pipeline (controller): configure / start / stop / stats, owns RunState
//!  PipelineStats: atomic counters written by both sides
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use live_autotune::audio::CpalBackend;
//! use live_autotune::pipeline::{Pipeline, PipelineConfig};
//! use live_autotune::tuning::AutotuneEngine;
//!
//! let pipeline = Pipeline::new(Arc::new(CpalBackend::new()), Arc::new(AutotuneEngine::default()));
//! pipeline.configure(PipelineConfig::scale("C major")).unwrap();
//! pipeline.start().unwrap();
//! std::thread::sleep(std::time::Duration::from_secs(10));
//! pipeline.stop();
//! println!("{}", pipeline.stats());
//! ```

pub mod controller;
pub mod queue;
pub mod state;
pub mod stats;
pub mod worker;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use controller::{Pipeline, PipelineConfig, PipelineError, TuningMode};
pub use queue::{handoff_queue, PopError, PushOutcome, QueueConsumer, QueueGauge, QueueProducer};
pub use state::{RunState, SharedRunState};
pub use stats::{PipelineStats, StatsSnapshot};
