//! A hardware-free backend whose callbacks are fired by hand.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::callback::DuplexCallback;
use super::device::{AudioBackend, CallbackStatus, DeviceError, DeviceIo, DeviceStream, StreamSpec};

type Slot = Arc<Mutex<Option<DuplexCallback>>>;

/// Test backend: `open` stores the duplex callback, [`ManualBackend::tick`]
/// runs one device period.
#[derive(Default, Clone)]
pub struct ManualBackend {
    slot: Slot,
    fail_open: bool,
    close_delay: Duration,
    opened: Arc<Mutex<Option<StreamSpec>>>,
}

impl ManualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose `open` always fails.
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// A backend whose streams stay open for `delay` after `close` is
    /// called, like a host that waits for its last period to finish.
    pub fn slow_close(delay: Duration) -> Self {
        Self {
            close_delay: delay,
            ..Self::default()
        }
    }

    pub fn is_open(&self) -> bool {
        self.slot.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    /// The spec of the most recent successful `open`.
    pub fn last_spec(&self) -> Option<StreamSpec> {
        self.opened.lock().ok().and_then(|s| s.clone())
    }

    /// Fire one callback with `input` and an output buffer of
    /// `output_len` samples.  `None` when no stream is open.
    pub fn tick(&self, input: &[f32], output_len: usize) -> Option<Vec<f32>> {
        self.tick_with_status(input, output_len, CallbackStatus::default())
    }

    pub fn tick_with_status(
        &self,
        input: &[f32],
        output_len: usize,
        status: CallbackStatus,
    ) -> Option<Vec<f32>> {
        let mut slot = self.slot.lock().ok()?;
        let callback = slot.as_mut()?;
        let mut output = vec![f32::NAN; output_len];
        callback.process(input, &mut output, status);
        Some(output)
    }
}

impl AudioBackend for ManualBackend {
    fn open(&self, spec: &StreamSpec, io: DeviceIo) -> Result<Box<dyn DeviceStream>, DeviceError> {
        if self.fail_open {
            return Err(DeviceError::Backend("manual backend refused to open".into()));
        }
        let callback = io.into_duplex(spec);
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(callback);
        }
        if let Ok(mut opened) = self.opened.lock() {
            *opened = Some(spec.clone());
        }
        Ok(Box::new(ManualStream {
            slot: Arc::clone(&self.slot),
            close_delay: self.close_delay,
        }))
    }
}

struct ManualStream {
    slot: Slot,
    close_delay: Duration,
}

impl DeviceStream for ManualStream {
    fn close(self: Box<Self>) {
        if !self.close_delay.is_zero() {
            thread::sleep(self.close_delay);
        }
        // Taking the callback under the lock waits for any in-progress tick.
        if let Ok(mut slot) = self.slot.lock() {
            slot.take();
        }
    }
}
