//! Change classification: caret dedup and content debouncing.
//!
//! Scroll events need neither and go straight to the transport.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::view::Rect;

/// Last broadcast caret position, in view pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CaretSample {
    pub x: f64,
    pub y: f64,
}

impl From<Rect> for CaretSample {
    fn from(rect: Rect) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
        }
    }
}

/// Detects caret moves between mutation batches.
///
/// Starts at the origin, so a caret first seen at (0, 0) is not a move.
#[derive(Debug, Default)]
pub struct CaretTracker {
    last: Mutex<CaretSample>,
}

impl CaretTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `sample`; true if x or y differs from the previous one.
    pub fn observe(&self, sample: CaretSample) -> bool {
        let mut last = self.last.lock();
        if last.x != sample.x || last.y != sample.y {
            *last = sample;
            true
        } else {
            false
        }
    }

    pub fn last(&self) -> CaretSample {
        *self.last.lock()
    }
}

/// Runs an action a fixed delay after the first trigger of a burst.
///
/// Triggers that arrive while a run is pending are folded into it; the
/// delay is never extended. The action reads whatever state is current
/// when it fires.
pub struct ContentDebouncer {
    delay: Duration,
    runtime: Handle,
    action: Arc<dyn Fn() + Send + Sync>,
    armed: Arc<AtomicBool>,
    fired: Arc<AtomicU64>,
    // `closed` is only written under this lock.
    pending: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ContentDebouncer {
    /// Debounce `action` on `runtime`. Triggers may come from any thread.
    pub fn new(delay: Duration, runtime: Handle, action: Arc<dyn Fn() + Send + Sync>) -> Self {
        Self {
            delay,
            runtime,
            action,
            armed: Arc::new(AtomicBool::new(false)),
            fired: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Schedule a run. Returns false when folded into a pending run or closed.
    pub fn trigger(&self) -> bool {
        let mut pending = self.pending.lock();
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        if self.armed.swap(true, Ordering::SeqCst) {
            log::trace!("content change folded into pending send");
            return false;
        }

        let delay = self.delay;
        let armed = self.armed.clone();
        let fired = self.fired.clone();
        let action = self.action.clone();
        *pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Disarm before running so a trigger during the action schedules anew.
            armed.store(false, Ordering::SeqCst);
            fired.fetch_add(1, Ordering::Relaxed);
            action();
        }));
        true
    }

    /// Drop the pending run, if any. Later triggers still work.
    pub fn cancel(&self) {
        let mut pending = self.pending.lock();
        if let Some(task) = pending.take() {
            task.abort();
        }
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Cancel and refuse all further triggers.
    pub fn close(&self) {
        let mut pending = self.pending.lock();
        self.closed.store(true, Ordering::SeqCst);
        if let Some(task) = pending.take() {
            task.abort();
        }
        self.armed.store(false, Ordering::SeqCst);
    }

    pub fn is_pending(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of runs that have fired.
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Drop for ContentDebouncer {
    fn drop(&mut self) {
        if let Some(task) = self.pending.get_mut().take() {
            task.abort();
        }
    }
}
