//! Bounded single-producer/single-consumer handoff between the real-time
//! callback and the processing worker.
//!
//! ```text
//! QueueProducer ──try_push / push_evicting──▶ [ bounded FIFO ] ──pop_timeout──▶ QueueConsumer
//! ```
//!
//! Every producer operation is non-blocking.  Two overflow policies exist:
//!
//! * [`QueueProducer::try_push`] rejects the new item when full (drop newest).
//! * [`QueueProducer::push_evicting`] discards the oldest queued item to make
//!   room (drop oldest, favours freshness).
//!
//! The producer keeps a private receiving handle so it can evict without
//! waiting on the consumer.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

/// Create a bounded handoff queue holding at most `capacity` items
/// (minimum 1).
pub fn handoff_queue<T>(capacity: usize) -> (QueueProducer<T>, QueueConsumer<T>) {
    let capacity = capacity.max(1);
    let (tx, rx) = bounded(capacity);
    let producer = QueueProducer {
        tx,
        evict: rx.clone(),
        capacity,
    };
    (producer, QueueConsumer { rx, capacity })
}

// ---------------------------------------------------------------------------
// PushOutcome / PopError
// ---------------------------------------------------------------------------

/// Result of [`QueueProducer::push_evicting`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The item was queued with room to spare.
    Queued,
    /// The queue was full; the oldest item was discarded and the new one queued.
    ReplacedOldest,
    /// The item could not be queued and was discarded.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// Nothing arrived within the wait.
    Timeout,
    /// The producer is gone and the queue is empty.
    Disconnected,
}

// ---------------------------------------------------------------------------
// QueueProducer
// ---------------------------------------------------------------------------

pub struct QueueProducer<T> {
    tx: Sender<T>,
    evict: Receiver<T>,
    capacity: usize,
}

impl<T> QueueProducer<T> {
    /// Queue `item` if there is room; hand it back otherwise.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(item) | TrySendError::Disconnected(item) => item,
        })
    }

    /// Queue `item`, discarding the oldest queued item if the queue is full.
    pub fn push_evicting(&self, item: T) -> PushOutcome {
        let item = match self.tx.try_send(item) {
            Ok(()) => return PushOutcome::Queued,
            Err(TrySendError::Disconnected(_)) => return PushOutcome::Rejected,
            Err(TrySendError::Full(item)) => item,
        };

        // Drop the oldest (may already be gone if the consumer raced us).
        let _ = self.evict.try_recv();
        match self.tx.try_send(item) {
            Ok(()) => PushOutcome::ReplacedOldest,
            Err(_) => PushOutcome::Rejected,
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ---------------------------------------------------------------------------
// QueueConsumer
// ---------------------------------------------------------------------------

pub struct QueueConsumer<T> {
    rx: Receiver<T>,
    capacity: usize,
}

impl<T> QueueConsumer<T> {
    /// Non-blocking pop; `None` when empty.
    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Pop, waiting at most `timeout` for an item.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, PopError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => PopError::Timeout,
            RecvTimeoutError::Disconnected => PopError::Disconnected,
        })
    }

    /// Discard everything currently queued; returns how many items were dropped.
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// A handle that can report the queue depth without consuming.
    pub fn gauge(&self) -> QueueGauge<T> {
        QueueGauge {
            rx: self.rx.clone(),
        }
    }
}

/// Read-only view used for diagnostics once the endpoints have moved into
/// their threads.
#[derive(Clone)]
pub struct QueueGauge<T> {
    rx: Receiver<T>,
}

impl<T> QueueGauge<T> {
    pub fn len(&self) -> usize {
        self.rx.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
