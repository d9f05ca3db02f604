//! One-shot completion sinks bridging handler callbacks to waiting callers.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::completion::{AsyncHandler, AsyncResult};
use crate::error::KeelError;
use crate::handler;

struct ListenerCore<V> {
    cell: Mutex<Option<AsyncResult<V>>>,
    ready: Condvar,
}

/// A one-shot gate: the waiting side blocks until the [`Completer`] is
/// invoked exactly once, then receives the value or the captured failure.
///
/// [`SyncListener::wait`] fully blocks the calling thread and is meant for
/// callers outside the handler pool. A handler thread awaiting a result it
/// may itself be responsible for producing must use
/// [`SyncListener::wait_cooperative`], which keeps draining that handler's
/// own queue instead of parking, so an operation queued on the awaiting
/// handler can still run.
pub struct SyncListener<V> {
    core: Arc<ListenerCore<V>>,
}

/// The completing side of a [`SyncListener`]. Cloneable so an operation can
/// hand it across retries; only the first completion wins.
pub struct Completer<V> {
    core: Arc<ListenerCore<V>>,
}

impl<V> Clone for Completer<V> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<V> Default for SyncListener<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> SyncListener<V> {
    /// Creates an unresolved listener.
    pub fn new() -> Self {
        Self {
            core: Arc::new(ListenerCore {
                cell: Mutex::new(None),
                ready: Condvar::new(),
            }),
        }
    }

    /// The completing side handed into the operation.
    pub fn completer(&self) -> Completer<V> {
        Completer {
            core: Arc::clone(&self.core),
        }
    }

    /// Blocks the calling thread until the completer fires, then returns the
    /// value or rethrows the captured failure.
    pub fn wait(self) -> AsyncResult<V> {
        let mut cell = self.core.cell.lock();
        loop {
            if let Some(outcome) = cell.take() {
                return outcome;
            }
            self.core.ready.wait(&mut cell);
        }
    }

    /// Waits without parking the calling handler.
    ///
    /// On a handler thread this loops: drain the handler's own queue, check
    /// for the published result, park briefly. On any other thread it
    /// degrades to [`SyncListener::wait`].
    pub fn wait_cooperative(self) -> AsyncResult<V> {
        let Some(worker) = handler::current_worker() else {
            return self.wait();
        };
        let brief = worker.cooperative_park_interval();
        loop {
            if let Some(outcome) = self.try_take() {
                return outcome;
            }
            worker.run_pending();
            if let Some(outcome) = self.try_take() {
                return outcome;
            }
            let mut cell = self.core.cell.lock();
            if cell.is_none() {
                let _ = self.core.ready.wait_for(&mut cell, brief);
            }
        }
    }

    fn try_take(&self) -> Option<AsyncResult<V>> {
        self.core.cell.lock().take()
    }
}

impl<V> Completer<V> {
    /// Publishes a successful result.
    pub fn succeed(&self, value: V) {
        self.complete(Ok(value));
    }

    /// Publishes a failure; the waiting side rethrows it.
    pub fn fail(&self, error: KeelError) {
        self.complete(Err(error));
    }

    /// Publishes `outcome`. Completions after the first are ignored.
    pub fn complete(&self, outcome: AsyncResult<V>) {
        let mut cell = self.core.cell.lock();
        if cell.is_none() {
            *cell = Some(outcome);
            self.core.ready.notify_all();
        }
    }
}

impl<V: Send + 'static> Completer<V> {
    /// Adapts this completer into the one-shot callback form operations
    /// store.
    pub fn into_handler(self) -> AsyncHandler<AsyncResult<V>> {
        Box::new(move |outcome| self.complete(outcome))
    }
}
