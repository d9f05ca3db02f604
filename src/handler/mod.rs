//! Handler abstraction and the cross-handler wake registry.

mod worker;

pub use worker::PageOpWorker;

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use tracing::warn;

use crate::op::PageOperation;

/// A dedicated worker owning one operation queue and one load counter.
///
/// Handlers are created by a [`crate::pool::HandlerPool`] (or injected into
/// one) and identified by a dense id usable as an array index. The waiting
/// methods form the engine's only cross-handler coordination channel: a
/// handler blocked on another handler's in-progress mutation registers itself
/// and is notified instead of spinning.
pub trait PageOperationHandler: Send + Sync {
    /// Dense, pool-unique identity.
    fn handler_id(&self) -> usize;

    /// Approximate count of unprocessed plus in-flight operations. Routing
    /// heuristics read this; it is not used for correctness.
    fn load(&self) -> u64;

    /// Enqueues an operation onto this handler.
    fn submit(&self, op: Box<dyn PageOperation>);

    /// Releases this handler's bounded sleep if it is currently parked.
    fn wake_up(&self);

    /// Registers `waiter` to be woken when this handler's resource state
    /// changes.
    fn add_waiting_handler(&self, waiter: Arc<dyn PageOperationHandler>);

    /// Wakes every registered waiter and clears the registry.
    fn wake_up_waiting_handlers(&self);

    /// Starts the handler; a no-op when already running.
    fn start(&self) {}

    /// Tells the handler loop to exit and releases its sleep.
    fn stop(&self) {}
}

/// Fixed-size registry of handlers waiting on this handler's resources,
/// indexed by waiter id.
///
/// A slot is armed with a plain store and cleared with a compare-and-swap, so
/// a waiter re-arming its slot concurrently with a wake sweep lands after the
/// clear and is never dropped. The waiter reference itself is written once:
/// handler ids are dense and stable for the life of a pool, so slot `i` only
/// ever refers to one handler.
pub(crate) struct WaiterTable {
    slots: Box<[WaiterSlot]>,
}

struct WaiterSlot {
    armed: AtomicBool,
    waiter: OnceLock<Arc<dyn PageOperationHandler>>,
}

impl WaiterTable {
    pub(crate) fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| WaiterSlot {
                armed: AtomicBool::new(false),
                waiter: OnceLock::new(),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { slots }
    }

    /// Arms the slot for `waiter`. Registration from a handler outside the
    /// table's pool is dropped; the waiter's own park timeout covers it.
    pub(crate) fn register(&self, waiter: Arc<dyn PageOperationHandler>) {
        let id = waiter.handler_id();
        let Some(slot) = self.slots.get(id) else {
            warn!(waiter_id = id, slots = self.slots.len(), "pageop.waiters.out_of_range");
            return;
        };
        let _ = slot.waiter.set(waiter);
        slot.armed.store(true, Ordering::Release);
    }

    /// Wakes every armed waiter, clearing each slot exactly once. Returns the
    /// number of waiters woken.
    pub(crate) fn wake_all(&self) -> u64 {
        let mut woken = 0;
        for slot in self.slots.iter() {
            if slot
                .armed
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                if let Some(waiter) = slot.waiter.get() {
                    waiter.wake_up();
                    woken += 1;
                }
            }
        }
        woken
    }
}

thread_local! {
    static CURRENT_WORKER: RefCell<Option<Weak<PageOpWorker>>> = const { RefCell::new(None) };
}

/// Installs `worker` as the current thread's handler identity.
pub(crate) fn set_current_worker(worker: &Arc<PageOpWorker>) {
    CURRENT_WORKER.with(|cell| *cell.borrow_mut() = Some(Arc::downgrade(worker)));
}

pub(crate) fn clear_current_worker() {
    CURRENT_WORKER.with(|cell| *cell.borrow_mut() = None);
}

/// The worker owning the current thread, when the caller is a handler thread.
pub(crate) fn current_worker() -> Option<Arc<PageOpWorker>> {
    CURRENT_WORKER.with(|cell| cell.borrow().as_ref().and_then(Weak::upgrade))
}
