//! Edge-triggered sleep/wake primitive for handler threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A releasable bounded wait owned by a single handler thread.
///
/// Wakes are edge-triggered: [`WakeHandle::wake_up`] is dropped unless the
/// owner is currently marked waiting, so wakes issued while the handler is
/// busy collapse to nothing instead of accumulating, and the signal flag is
/// consumed by every park. [`WakeHandle::force`] bypasses the gate and is
/// reserved for shutdown, where a dropped wake would stall the stop.
pub(crate) struct WakeHandle {
    signalled: Mutex<bool>,
    wakeup: Condvar,
    waiting: AtomicBool,
}

impl WakeHandle {
    pub(crate) fn new() -> Self {
        Self {
            signalled: Mutex::new(false),
            wakeup: Condvar::new(),
            waiting: AtomicBool::new(false),
        }
    }

    /// Blocks the owner thread until a wake arrives or `timeout` elapses.
    ///
    /// Returns `true` when released by a wake rather than the timeout. The
    /// waiting marker is only set for the duration of the park; callers
    /// re-poll their queues after every return.
    pub(crate) fn park(&self, timeout: Duration) -> bool {
        self.waiting.store(true, Ordering::Release);
        let mut signalled = self.signalled.lock();
        if !*signalled {
            let _ = self.wakeup.wait_for(&mut signalled, timeout);
        }
        let woken = *signalled;
        *signalled = false;
        drop(signalled);
        self.waiting.store(false, Ordering::Release);
        woken
    }

    /// Releases the owner if it is parked; otherwise the wake is dropped.
    pub(crate) fn wake_up(&self) {
        if !self.waiting.load(Ordering::Acquire) {
            return;
        }
        let mut signalled = self.signalled.lock();
        *signalled = true;
        self.wakeup.notify_one();
    }

    /// Unconditional wake that is never dropped. Shutdown only.
    pub(crate) fn force(&self) {
        let mut signalled = self.signalled.lock();
        *signalled = true;
        self.wakeup.notify_one();
    }
}
