//! Routing factory owning the fixed handler pool.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info};

use crate::config::{PoolOptions, RoutingPolicy};
use crate::error::{KeelError, Result};
use crate::handler::{self, PageOpWorker, PageOperationHandler};
use crate::listener::{Completer, SyncListener};
use crate::metrics::{NoopMetrics, SchedMetrics};
use crate::op::PageOperation;

/// Owns a fixed array of page-operation handlers and routes each submission
/// to one of them under the configured policy.
///
/// Handler count and identity are fixed at construction. A pool either
/// builds and starts its own worker threads, or adopts an externally managed
/// handler array via [`HandlerPool::with_handlers`] without starting
/// anything.
pub struct HandlerPool {
    handlers: Box<[Arc<dyn PageOperationHandler>]>,
    workers: Vec<Arc<PageOpWorker>>,
    policy: RoutingPolicy,
    rr_index: AtomicUsize,
    daemon: bool,
    stopped: AtomicBool,
}

impl HandlerPool {
    /// Builds `options.handlers` workers and starts each of them.
    pub fn new(options: PoolOptions) -> Result<Self> {
        options.validate()?;
        let metrics: Arc<dyn SchedMetrics> = options
            .metrics
            .clone()
            .unwrap_or_else(|| Arc::new(NoopMetrics));
        let count = options.handlers;
        let mut workers = Vec::with_capacity(count);
        for id in 0..count {
            workers.push(PageOpWorker::new(
                id,
                count,
                options.loop_interval,
                Arc::clone(&metrics),
            ));
        }
        let handlers = workers
            .iter()
            .map(|worker| Arc::clone(worker) as Arc<dyn PageOperationHandler>)
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let pool = Self {
            handlers,
            workers,
            policy: options.policy,
            rr_index: AtomicUsize::new(0),
            daemon: options.daemon,
            stopped: AtomicBool::new(false),
        };
        pool.start_handlers()?;
        info!(
            handlers = count,
            policy = pool.policy.name(),
            "pageop.pool.start"
        );
        Ok(pool)
    }

    /// Adopts an externally managed handler array. No handlers are started;
    /// their lifecycle belongs to the embedder.
    ///
    /// Handler ids must be dense (`0..n` in array order): they index the
    /// per-handler waiting tables.
    pub fn with_handlers(
        options: PoolOptions,
        handlers: Vec<Arc<dyn PageOperationHandler>>,
    ) -> Result<Self> {
        if handlers.is_empty() {
            return Err(KeelError::Config("injected handler array is empty".into()));
        }
        for (index, h) in handlers.iter().enumerate() {
            if h.handler_id() != index {
                return Err(KeelError::Config(format!(
                    "handler ids must be dense: expected {index}, found {}",
                    h.handler_id()
                )));
            }
        }
        Ok(Self {
            handlers: handlers.into_boxed_slice(),
            workers: Vec::new(),
            policy: options.policy,
            rr_index: AtomicUsize::new(0),
            daemon: options.daemon,
            stopped: AtomicBool::new(false),
        })
    }

    /// Starts every self-built worker. A no-op for adopted handler arrays
    /// and for workers already running.
    pub fn start_handlers(&self) -> Result<()> {
        for worker in &self.workers {
            worker.start_worker()?;
        }
        Ok(())
    }

    /// Signals every handler to stop and releases parked loops, then joins
    /// self-built worker threads unless the pool is daemonic. Idempotent.
    pub fn stop_handlers(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        for h in self.handlers.iter() {
            h.stop();
        }
        if !self.daemon {
            for worker in &self.workers {
                worker.join();
            }
        }
        info!(policy = self.policy.name(), "pageop.pool.stop");
    }

    /// Number of handlers in the pool.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// The handler at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn handler(&self, index: usize) -> &Arc<dyn PageOperationHandler> {
        &self.handlers[index]
    }

    /// Picks a handler for a new submission under the active policy.
    pub fn route(&self) -> &Arc<dyn PageOperationHandler> {
        let n = self.handlers.len();
        let index = match self.policy {
            RoutingPolicy::Random => rand::thread_rng().gen_range(0..n),
            RoutingPolicy::RoundRobin => self.rr_index.fetch_add(1, Ordering::Relaxed) % n,
            RoutingPolicy::LoadBalance => {
                // Strict improvement only, so ties keep the first minimum.
                let mut index = 0;
                let mut min_load = self.handlers[0].load();
                for (i, h) in self.handlers.iter().enumerate().skip(1) {
                    let load = h.load();
                    if load < min_load {
                        min_load = load;
                        index = i;
                    }
                }
                index
            }
        };
        &self.handlers[index]
    }

    /// Submits an operation. A submission from a handler thread runs inline
    /// on that thread, on the same call stack, rather than being queued;
    /// anything else is routed under the active policy.
    pub fn submit(&self, op: Box<dyn PageOperation>) {
        if let Some(worker) = handler::current_worker() {
            worker.run_inline(op);
            return;
        }
        let target = self.route();
        debug!(handler_id = target.handler_id(), "pageop.pool.route");
        target.submit(op);
    }

    /// Submits an operation wired to a one-shot listener and waits for its
    /// result: cooperatively when the caller is itself a handler thread,
    /// blocking otherwise.
    pub fn submit_and_await<V, F>(&self, make_op: F) -> Result<V>
    where
        V: Send + 'static,
        F: FnOnce(Completer<V>) -> Box<dyn PageOperation>,
    {
        let listener = SyncListener::new();
        let op = make_op(listener.completer());
        self.submit(op);
        listener.wait_cooperative()
    }
}

impl std::fmt::Debug for HandlerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerPool")
            .field("handlers", &self.handlers.len())
            .field("workers", &self.workers.len())
            .field("policy", &self.policy)
            .field("daemon", &self.daemon)
            .finish()
    }
}

impl Drop for HandlerPool {
    fn drop(&mut self) {
        self.stop_handlers();
    }
}
