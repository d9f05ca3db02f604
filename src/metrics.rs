//! Scheduling metrics hooks.

use std::sync::atomic::{AtomicU64, Ordering};

/// Trait for observing handler-pool activity.
///
/// Implementations collect counters for submissions, completions, and the
/// contention paths (retries, locked parks, cross-handler wakes). Methods are
/// invoked from handler hot loops and must be cheap and thread-safe.
pub trait SchedMetrics: Send + Sync {
    /// Records an operation queued onto a handler.
    fn op_submitted(&self);

    /// Records an operation executed inline on the submitting handler thread.
    fn op_inline(&self);

    /// Records a terminal completion.
    ///
    /// # Parameters
    /// * `status` - stable status label, e.g. `"succeeded"` or `"failed"`.
    fn op_completed(&self, status: &'static str);

    /// Records one immediate re-execution after a retry status.
    fn op_retried(&self);

    /// Records a handler parking with a held locked operation.
    fn locked_park(&self);

    /// Records an operation discarded because it panicked.
    fn op_panicked(&self);

    /// Records handlers woken through a waiting-handler registry sweep.
    fn waiters_woken(&self, count: u64);
}

/// A no-op implementation of [`SchedMetrics`] that discards all samples.
///
/// Used when metrics collection is disabled, keeping the hot paths free of
/// any accounting overhead.
#[derive(Default)]
pub struct NoopMetrics;

impl SchedMetrics for NoopMetrics {
    fn op_submitted(&self) {}
    fn op_inline(&self) {}
    fn op_completed(&self, _status: &'static str) {}
    fn op_retried(&self) {}
    fn locked_park(&self) {}
    fn op_panicked(&self) {}
    fn waiters_woken(&self, _count: u64) {}
}

/// A thread-safe counter-based implementation of [`SchedMetrics`].
#[derive(Default)]
pub struct CounterMetrics {
    /// Operations queued onto handlers.
    pub submitted: AtomicU64,

    /// Operations executed inline on a submitting handler thread.
    pub inline_runs: AtomicU64,

    /// Terminal completions, all statuses.
    pub completed: AtomicU64,

    /// Terminal completions with a failed status.
    pub failed: AtomicU64,

    /// Immediate re-executions after a retry status.
    pub retries: AtomicU64,

    /// Parks entered with a held locked operation.
    pub locked_parks: AtomicU64,

    /// Operations discarded because they panicked.
    pub panics: AtomicU64,

    /// Handlers woken through waiting-handler registries.
    pub waiter_wakes: AtomicU64,
}

impl SchedMetrics for CounterMetrics {
    fn op_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    fn op_inline(&self) {
        self.inline_runs.fetch_add(1, Ordering::Relaxed);
    }

    fn op_completed(&self, status: &'static str) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if status == "failed" {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn op_retried(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    fn locked_park(&self) {
        self.locked_parks.fetch_add(1, Ordering::Relaxed);
    }

    fn op_panicked(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    fn waiters_woken(&self, count: u64) {
        self.waiter_wakes.fetch_add(count, Ordering::Relaxed);
    }
}
