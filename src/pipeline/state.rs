//! Run-state machine shared by the controller and the worker.
//!
//! ```text
//! Idle ──start()──▶ Running ──stop()──▶ Stopping ──worker joined──▶ Idle
//! ```
//!
//! Only the controller writes the state.  The worker polls it once per loop
//! iteration through a [`SharedRunState`], so no lock is taken on the hot path.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// No worker, no device stream.
    #[default]
    Idle,
    /// Device stream open and the worker correcting blocks.
    Running,
    /// Stop requested: the device is closing and the worker draining.
    Stopping,
}

impl RunState {
    /// A short human-readable label for logs.
    ///
    /// ```
    /// use live_autotune::pipeline::RunState;
    ///
    /// assert_eq!(RunState::Idle.label(), "Idle");
    /// assert_eq!(RunState::Stopping.label(), "Stopping");
    /// ```
    pub fn label(&self) -> &'static str {
        match self {
            RunState::Idle => "Idle",
            RunState::Running => "Running",
            RunState::Stopping => "Stopping",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            RunState::Idle => 0,
            RunState::Running => 1,
            RunState::Stopping => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => RunState::Running,
            2 => RunState::Stopping,
            _ => RunState::Idle,
        }
    }
}

// ---------------------------------------------------------------------------
// SharedRunState
// ---------------------------------------------------------------------------

/// Thread-safe handle to a [`RunState`].  Cheap to clone (`Arc` clone).
#[derive(Debug, Clone, Default)]
pub struct SharedRunState(Arc<AtomicU8>);

impl SharedRunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> RunState {
        RunState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: RunState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }

    /// Move from `from` to `to` only if the current state is `from`.
    /// On failure returns the state actually observed.
    pub fn transition(&self, from: RunState, to: RunState) -> Result<(), RunState> {
        self.0
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(RunState::from_u8)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
