//! The threaded page-operation handler.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{KeelError, Result};
use crate::metrics::SchedMetrics;
use crate::op::{PageOpResult, PageOperation};
use crate::wake::WakeHandle;

use super::{PageOperationHandler, WaiterTable};

/// Bound on a single park inside a cooperative wait. Short enough that a
/// completion published by another handler is observed promptly, long enough
/// to avoid spinning.
const COOPERATIVE_PARK: Duration = Duration::from_millis(1);

/// State of the per-handler held-operation slot.
enum HeldOp {
    /// No operation is held back.
    Idle,
    /// A locked operation waiting to be retried ahead of the queue.
    Holding(Box<dyn PageOperation>),
}

/// Why a drain pass stopped.
enum Pause {
    /// Queue and held slot are exhausted.
    Empty,
    /// An operation reported `Locked` and was held aside; the handler parks
    /// instead of busy-looping against the contended resource.
    Locked,
}

/// Handler-level decision for one operation.
enum Drive {
    Terminal(PageOpResult),
    Locked(Box<dyn PageOperation>),
}

/// A dedicated worker thread draining one FIFO of page operations.
///
/// The worker reacts to each operation's reported status: `Retry` re-executes
/// in place, `Locked` holds the operation aside and parks until woken, and
/// everything else is terminal. Panics inside an operation are caught and
/// logged; they never stop the loop. `load` is incremented before an
/// operation becomes visible in the queue and decremented only once it
/// reaches a terminal status, so it never undercounts queue depth.
pub struct PageOpWorker {
    id: usize,
    queue: SegQueue<Box<dyn PageOperation>>,
    load: AtomicU64,
    wake: WakeHandle,
    waiters: WaiterTable,
    held: Mutex<HeldOp>,
    stopped: AtomicBool,
    loop_interval: Duration,
    metrics: Arc<dyn SchedMetrics>,
    self_ref: Weak<PageOpWorker>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl PageOpWorker {
    /// Builds the worker for slot `id` of a pool with `pool_size` handlers.
    /// Nothing is processed until [`PageOpWorker::start_worker`] runs.
    pub fn new(
        id: usize,
        pool_size: usize,
        loop_interval: Duration,
        metrics: Arc<dyn SchedMetrics>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            id,
            queue: SegQueue::new(),
            load: AtomicU64::new(0),
            wake: WakeHandle::new(),
            waiters: WaiterTable::new(pool_size),
            held: Mutex::new(HeldOp::Idle),
            stopped: AtomicBool::new(false),
            loop_interval,
            metrics,
            self_ref: me.clone(),
            thread: Mutex::new(None),
        })
    }

    /// Spawns the worker thread. Subsequent calls are no-ops.
    pub fn start_worker(&self) -> Result<()> {
        let mut slot = self.thread.lock();
        if slot.is_some() || self.stopped.load(Ordering::Acquire) {
            return Ok(());
        }
        let Some(worker) = self.self_ref.upgrade() else {
            return Ok(());
        };
        let handle = thread::Builder::new()
            .name(format!("keel-pageop-{}", self.id))
            .spawn(move || worker.run_loop())
            .map_err(|err| KeelError::Spawn(err.to_string()))?;
        *slot = Some(handle);
        Ok(())
    }

    /// Tells the loop to exit and releases any in-progress park. The wake
    /// bypasses the edge-trigger so a stop cannot be deferred by a full idle
    /// interval.
    pub fn stop_worker(&self) {
        self.stopped.store(true, Ordering::Release);
        self.wake.force();
    }

    /// Waits for the worker thread to exit after [`PageOpWorker::stop_worker`].
    pub(crate) fn join(&self) {
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(handler_id = self.id, "pageop.worker.join_panicked");
            }
        }
    }

    fn run_loop(self: Arc<Self>) {
        super::set_current_worker(&self);
        info!(handler_id = self.id, "pageop.worker.start");
        while !self.stopped.load(Ordering::Acquire) {
            match self.drain() {
                Pause::Empty => {
                    if self.stopped.load(Ordering::Acquire) {
                        break;
                    }
                    if self.queue.is_empty() {
                        self.wake.park(self.loop_interval);
                    }
                }
                Pause::Locked => {
                    if self.stopped.load(Ordering::Acquire) {
                        break;
                    }
                    self.metrics.locked_park();
                    debug!(handler_id = self.id, "pageop.worker.locked_park");
                    self.wake.park(self.loop_interval);
                }
            }
        }
        super::clear_current_worker();
        info!(handler_id = self.id, "pageop.worker.stop");
    }

    /// Processes the held operation, then the queue, until both are exhausted
    /// or an operation reports `Locked`.
    fn drain(&self) -> Pause {
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return Pause::Empty;
            }
            let op = match self.take_held() {
                Some(op) => op,
                None => match self.queue.pop() {
                    Some(op) => op,
                    None => return Pause::Empty,
                },
            };
            match self.drive(op) {
                Drive::Terminal(status) => self.finish(status),
                Drive::Locked(op) => {
                    self.stash(op);
                    return Pause::Locked;
                }
            }
        }
    }

    /// Runs queued work on behalf of a cooperative wait. The awaiting thread
    /// is this worker's own thread, so the operation producing the awaited
    /// result may be sitting in this very queue.
    pub(crate) fn run_pending(&self) {
        let _ = self.drain();
    }

    /// Bound used by cooperative waits between drain passes.
    pub(crate) fn cooperative_park_interval(&self) -> Duration {
        COOPERATIVE_PARK.min(self.loop_interval)
    }

    /// Runs `op` on the calling handler thread without queuing it. `Retry`
    /// loops in place like the worker loop; `Locked` transfers the operation
    /// into this worker's held slot (with a matching load increment) so the
    /// wake/retry path applies to inline submissions too.
    pub(crate) fn run_inline(&self, op: Box<dyn PageOperation>) {
        self.metrics.op_inline();
        match self.drive(op) {
            Drive::Terminal(status) => {
                self.metrics.op_completed(status.name());
                debug!(handler_id = self.id, status = status.name(), "pageop.worker.inline_done");
            }
            Drive::Locked(op) => {
                self.load.fetch_add(1, Ordering::AcqRel);
                self.stash(op);
            }
        }
    }

    /// Drives one operation to a handler-level decision: terminal status or
    /// a locked hand-back. `Retry` is re-executed in a tight loop; a panic is
    /// caught, logged, and treated as a terminal failure.
    fn drive(&self, mut op: Box<dyn PageOperation>) -> Drive {
        loop {
            let attempt = {
                let handler: &dyn PageOperationHandler = self;
                panic::catch_unwind(AssertUnwindSafe(|| op.run(handler)))
            };
            match attempt {
                Ok(PageOpResult::Retry) => {
                    self.metrics.op_retried();
                }
                Ok(PageOpResult::Locked) => return Drive::Locked(op),
                Ok(status) => return Drive::Terminal(status),
                Err(payload) => {
                    let reason = panic_reason(payload.as_ref());
                    warn!(handler_id = self.id, reason, "pageop.worker.op_panic");
                    self.metrics.op_panicked();
                    return Drive::Terminal(PageOpResult::Failed);
                }
            }
        }
    }

    fn finish(&self, status: PageOpResult) {
        self.load.fetch_sub(1, Ordering::AcqRel);
        self.metrics.op_completed(status.name());
        debug!(handler_id = self.id, status = status.name(), "pageop.worker.op_done");
    }

    fn take_held(&self) -> Option<Box<dyn PageOperation>> {
        let mut held = self.held.lock();
        match std::mem::replace(&mut *held, HeldOp::Idle) {
            HeldOp::Idle => None,
            HeldOp::Holding(op) => Some(op),
        }
    }

    /// Parks `op` in the held slot so it is retried ahead of the queue. The
    /// slot can already be occupied when a cooperative wait drained the queue
    /// reentrantly; the operation losing that race is requeued at the tail.
    fn stash(&self, op: Box<dyn PageOperation>) {
        let mut held = self.held.lock();
        match &*held {
            HeldOp::Idle => *held = HeldOp::Holding(op),
            HeldOp::Holding(_) => {
                drop(held);
                debug!(handler_id = self.id, "pageop.worker.held_slot_busy");
                self.queue.push(op);
            }
        }
    }
}

impl PageOperationHandler for PageOpWorker {
    fn handler_id(&self) -> usize {
        self.id
    }

    fn load(&self) -> u64 {
        self.load.load(Ordering::Acquire)
    }

    fn submit(&self, op: Box<dyn PageOperation>) {
        self.load.fetch_add(1, Ordering::AcqRel);
        self.queue.push(op);
        self.metrics.op_submitted();
        self.wake.wake_up();
    }

    fn wake_up(&self) {
        self.wake.wake_up();
    }

    fn add_waiting_handler(&self, waiter: Arc<dyn PageOperationHandler>) {
        self.waiters.register(waiter);
    }

    fn wake_up_waiting_handlers(&self) {
        let woken = self.waiters.wake_all();
        if woken > 0 {
            self.metrics.waiters_woken(woken);
            debug!(handler_id = self.id, woken, "pageop.worker.waiters_woken");
        }
    }

    fn start(&self) {
        if let Err(err) = self.start_worker() {
            warn!(handler_id = self.id, error = %err, "pageop.worker.start_failed");
        }
    }

    fn stop(&self) {
        self.stop_worker();
    }
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
